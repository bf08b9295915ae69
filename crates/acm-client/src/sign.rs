// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request signing.
//!
//! Every signed request carries an HMAC-SHA1 over `namespace+group+timestamp`
//! keyed by the caller's secret key, base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// String the signature is computed over.
pub fn canonical_string(namespace: &str, group: &str, timestamp_millis: u64) -> String {
    format!("{namespace}+{group}+{timestamp_millis}")
}

/// Computes the `Spas-Signature` value for a request.
pub fn sign(namespace: &str, group: &str, timestamp_millis: u64, secret_key: &str) -> String {
    // HMAC accepts keys of any length.
    #[allow(clippy::expect_used)]
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC key should be valid");
    mac.update(canonical_string(namespace, group, timestamp_millis).as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}
