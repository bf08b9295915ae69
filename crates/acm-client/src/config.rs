// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client options and environment-driven bootstrap.
//!
//! [`ClientOptions`] carries the construction-time inputs of a
//! [`ConfigClient`](crate::ConfigClient): discovery endpoint, identity and
//! transport knobs. [`AcmEnv`] derives those options from the process
//! environment so binaries and tests can bootstrap the client without
//! hand-written plumbing.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderValue;

use crate::error::{AcmError, Result};
use crate::http::TransportOptions;
use crate::key::DEFAULT_GROUP;
use crate::server_list::DEFAULT_DISCOVERY_PORT;

/// Port config servers listen on for plain HTTP.
pub const DEFAULT_SERVER_PORT: u16 = 8080;
/// Port config servers listen on for HTTPS.
pub const DEFAULT_SSL_PORT: u16 = 443;
/// Long-poll hold time advertised to the server.
pub const DEFAULT_LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);
/// Client-side deadline for a long-poll probe; must exceed the server hint.
pub const DEFAULT_LONG_POLL_CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

const ENV_ENDPOINT: &str = "ACM_ENDPOINT";
const ENV_NAMESPACE: &str = "ACM_NAMESPACE";
const ENV_ACCESS_KEY: &str = "ACM_ACCESS_KEY";
const ENV_SECRET_KEY: &str = "ACM_SECRET_KEY";
const ENV_DATA_ID: &str = "ACM_DATA_ID";
const ENV_GROUP: &str = "ACM_GROUP";
/// Switches config requests to `https` on the SSL port.
const ENV_SSL: &str = "ACM_SSL";
/// Set to `false` to enforce certificate validation.
const ENV_NO_TLS_VALIDATION: &str = "ACM_NO_TLS_VALIDATION";
const ENV_PROXY_HTTPS: &str = "ACM_PROXY_HTTPS";
const ENV_HTTPS_PROXY: &str = "HTTPS_PROXY";
const ENV_LOG_LEVEL: &str = "ACM_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Construction-time inputs of a config client.
#[derive(Clone)]
pub struct ClientOptions {
    /// Discovery host (no scheme, no port).
    pub endpoint: String,
    /// Tenant the configs live in.
    pub namespace: String,
    pub access_key: String,
    pub secret_key: String,
    /// Talk to config servers over `https` on `ssl_port` instead of `http` on `server_port`.
    pub use_ssl: bool,
    /// Skip certificate validation for config servers.
    ///
    /// Defaults to `true`: servers are addressed by the IP handed out by the
    /// discovery endpoint, which their certificates do not cover. Turn this
    /// off only when the backend presents certificates valid for those IPs.
    pub accept_invalid_certs: bool,
    pub discovery_port: u16,
    pub server_port: u16,
    pub ssl_port: u16,
    pub https_proxy: Option<String>,
    /// How long the server may hold a probe before answering "unchanged".
    pub long_poll_timeout: Duration,
    /// Hard client-side deadline for a probe.
    pub long_poll_client_timeout: Duration,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("discovery_port", &self.discovery_port)
            .field("server_port", &self.server_port)
            .field("ssl_port", &self.ssl_port)
            .field("https_proxy", &self.https_proxy)
            .field("long_poll_timeout", &self.long_poll_timeout)
            .field("long_poll_client_timeout", &self.long_poll_client_timeout)
            .finish()
    }
}

impl ClientOptions {
    pub fn new(
        endpoint: impl Into<String>,
        namespace: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: namespace.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            use_ssl: false,
            accept_invalid_certs: true,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            server_port: DEFAULT_SERVER_PORT,
            ssl_port: DEFAULT_SSL_PORT,
            https_proxy: None,
            long_poll_timeout: DEFAULT_LONG_POLL_TIMEOUT,
            long_poll_client_timeout: DEFAULT_LONG_POLL_CLIENT_TIMEOUT,
        }
    }

    /// Checks the options before any network activity.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("endpoint", &self.endpoint),
            ("namespace", &self.namespace),
            ("accessKey", &self.access_key),
            ("secretKey", &self.secret_key),
        ] {
            if value.trim().is_empty() {
                return Err(AcmError::Configuration(format!(
                    "options.{name} is required"
                )));
            }
        }

        if HeaderValue::from_str(&self.access_key).is_err() {
            return Err(AcmError::Configuration(
                "options.accessKey contains characters not allowed in a header".to_string(),
            ));
        }

        if self.discovery_port == 0 || self.server_port == 0 || self.ssl_port == 0 {
            return Err(AcmError::Configuration(
                "ports must be greater than 0".to_string(),
            ));
        }

        if self.long_poll_client_timeout <= self.long_poll_timeout {
            return Err(AcmError::Configuration(format!(
                "long poll client timeout ({:?}) must exceed the server hint ({:?})",
                self.long_poll_client_timeout, self.long_poll_timeout
            )));
        }

        Ok(())
    }

    /// URL scheme and port used to reach config servers.
    pub fn scheme_and_port(&self) -> (&'static str, u16) {
        if self.use_ssl {
            ("https", self.ssl_port)
        } else {
            ("http", self.server_port)
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            accept_invalid_certs: self.accept_invalid_certs,
            https_proxy: self.https_proxy.clone(),
        }
    }
}

/// Client settings captured from the process environment.
#[derive(Clone)]
pub struct AcmEnv {
    pub endpoint: Option<String>,
    pub namespace: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Config to fetch and watch; only binaries use it.
    pub data_id: Option<String>,
    pub group: String,
    pub use_ssl: bool,
    pub no_tls_validation: bool,
    pub https_proxy: Option<String>,
    pub log_level: String,
}

impl fmt::Debug for AcmEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcmEnv")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("data_id", &self.data_id)
            .field("group", &self.group)
            .field("use_ssl", &self.use_ssl)
            .field("no_tls_validation", &self.no_tls_validation)
            .field("https_proxy", &self.https_proxy)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl AcmEnv {
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |name: &str| map.get(name).and_then(|value| sanitize_non_empty(value));

        let https_proxy = get(ENV_PROXY_HTTPS).or_else(|| get(ENV_HTTPS_PROXY));
        let log_level = get(ENV_LOG_LEVEL)
            .map(|level| level.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            endpoint: get(ENV_ENDPOINT),
            namespace: get(ENV_NAMESPACE),
            access_key: get(ENV_ACCESS_KEY),
            secret_key: get(ENV_SECRET_KEY),
            data_id: get(ENV_DATA_ID),
            group: get(ENV_GROUP).unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            use_ssl: parse_bool(map.get(ENV_SSL).map(String::as_str), false),
            no_tls_validation: parse_bool(
                map.get(ENV_NO_TLS_VALIDATION).map(String::as_str),
                true,
            ),
            https_proxy,
            log_level,
        }
    }

    /// Converts the captured settings into validated [`ClientOptions`].
    pub fn to_options(&self) -> Result<ClientOptions> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| AcmError::Configuration(format!("{name} is required")))
        };
        let mut options = ClientOptions::new(
            required(&self.endpoint, ENV_ENDPOINT)?,
            required(&self.namespace, ENV_NAMESPACE)?,
            required(&self.access_key, ENV_ACCESS_KEY)?,
            required(&self.secret_key, ENV_SECRET_KEY)?,
        );
        options.use_ssl = self.use_ssl;
        options.accept_invalid_certs = self.no_tls_validation;
        options.https_proxy = self.https_proxy.clone();
        options.validate()?;
        Ok(options)
    }
}

fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}
