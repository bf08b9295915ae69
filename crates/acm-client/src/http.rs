// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP plumbing for the ACM client.
//!
//! Requests are described by [`HttpRequest`] and executed by a [`Transport`].
//! The default transport wraps a shared `reqwest::Client`; embedders and tests
//! can substitute their own implementation. Status classification and header
//! redaction live here so discovery, fetches and long-poll probes handle
//! responses the same way.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::debug;

// Header names are kept lowercase; the backend matches them case-insensitively.

/// Access key header attached to every signed request.
pub const HEADER_ACCESS_KEY: &str = "spas-accesskey";
/// Millisecond timestamp the signature was computed over.
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// Base64 HMAC-SHA1 request signature.
pub const HEADER_SIGNATURE: &str = "spas-signature";
/// How long (ms) the server may hold a long-poll probe before answering "unchanged".
pub const HEADER_LONG_POLL_TIMEOUT: &str = "longpullingtimeout";

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum HttpError {
    /// DNS, TLS, socket or body-decoding failure reported by the HTTP stack.
    #[error("transport error: {0}")]
    Request(#[from] reqwest::Error),
    /// The request exceeded its client-side deadline.
    #[error("request timed out")]
    Timeout,
    /// The backend answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),
    /// The HTTP client could not be built (invalid proxy, TLS backend, ...).
    #[error("http client configuration error: {0}")]
    Client(String),
}

/// A single request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL, possibly already carrying a query string.
    pub url: String,
    /// Extra query parameters appended to `url`.
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Form fields sent as an `application/x-www-form-urlencoded` body.
    pub form: Vec<(String, String)>,
    /// Per-request deadline; `None` leaves the client default in place.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            form: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status and text body returned by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns the body of a successful response, or the classified status error.
    pub fn into_body(self) -> Result<String, HttpError> {
        classify_status(self.status)?;
        Ok(self.body)
    }
}

/// Black-box request/response function used by every component of the client.
///
/// Implementations must honour [`HttpRequest::timeout`] and report transport
/// failures as [`HttpError`]; status classification is left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Options governing how the default transport is constructed.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Skip TLS certificate and hostname validation.
    pub accept_invalid_certs: bool,
    /// Proxy used for HTTPS traffic.
    pub https_proxy: Option<String>,
}

/// [`Transport`] backed by a reusable `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, HttpError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(options.accept_invalid_certs);
        if let Some(proxy) = &options.https_proxy {
            let proxy = reqwest::Proxy::https(proxy.as_str())
                .map_err(|err| HttpError::Client(format!("invalid https proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|err| HttpError::Client(err.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            url,
            query,
            headers,
            form,
            timeout,
        } = request;

        debug!(
            method = %method,
            url = %url,
            headers = ?redact_headers(&headers),
            form_fields = form.len(),
            "acm HTTP request"
        );

        let mut builder = self
            .client
            .request(method.clone(), url.as_str())
            .headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if !form.is_empty() {
            builder = builder.form(&form);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!(
            method = %method,
            url = %url,
            status = %status,
            body_len = body.len(),
            "acm HTTP response"
        );

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout
    } else {
        HttpError::Request(err)
    }
}

/// Maps an HTTP status code onto the client error taxonomy.
pub fn classify_status(status: u16) -> Result<(), HttpError> {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_success() => Ok(()),
        _ => Err(HttpError::Status(status)),
    }
}

/// Returns a redacted view of request headers suitable for debug logging.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 3] = ["spas-accesskey", "spas-signature", "authorization"];

    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}
