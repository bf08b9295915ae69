// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the ACM configuration service.
//!
//! The crate resolves backend servers through the discovery endpoint, fetches
//! configuration values with signed requests and keeps a local copy current
//! through long-polling. [`ConfigClient`] is the entry point; the remaining
//! modules expose the building blocks (signing, discovery, transport) for
//! embedders that need to swap or reuse them.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod key;
pub mod server_list;
pub mod sign;
pub mod subscription;
#[cfg(test)]
pub(crate) mod test_support;
pub mod util;

pub use client::{ConfigClient, ConfigClientBuilder, CONFIG_PATH};
pub use config::{AcmEnv, ClientOptions};
pub use error::{AcmError, Result};
pub use http::{
    HttpError, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportOptions,
};
pub use key::{ConfigKey, DEFAULT_GROUP};
pub use server_list::{AddressResolver, ServerListCache, ServerListResolver, Unit};
pub use sign::sign;
pub use subscription::{ProbeOutcome, SubscribeOutcome, SubscriptionState};
pub use util::content_fingerprint;
