// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

/// Hex MD5 fingerprint of the cached content; empty when nothing is cached.
///
/// The digest is taken over the GBK encoding of the content, which is what the
/// server compares against.
pub fn content_fingerprint(content: Option<&str>) -> String {
    match content {
        Some(content) if !content.is_empty() => {
            let (bytes, _, _) = encoding_rs::GBK.encode(content);
            format!("{:x}", md5::compute(bytes))
        }
        _ => String::new(),
    }
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
