// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-shot config fetches and signed request headers.
//!
//! A [`ConfigClient`] owns the identity, talks to the backend through a
//! [`Transport`] and finds the backend through an [`AddressResolver`]. The
//! first signed request resolves the "current unit" address once and reuses
//! it for the lifetime of the client. Fetched content is cached and published
//! on a watch channel so embedders can observe refreshes driven by the
//! long-poll subscription.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::{watch, OnceCell};
use tracing::debug;

use crate::config::ClientOptions;
use crate::error::{AcmError, Result};
use crate::http::{
    HttpRequest, ReqwestTransport, Transport, HEADER_ACCESS_KEY, HEADER_SIGNATURE,
    HEADER_TIMESTAMP,
};
use crate::key::ConfigKey;
use crate::server_list::{AddressResolver, ServerListCache, ServerListResolver, Unit};
use crate::sign::sign;
use crate::subscription::SubscriptionFlags;
use crate::util::now_millis;

/// Path shared by config fetches and long-poll probes.
pub const CONFIG_PATH: &str = "/config.co";

/// Client for a single namespace of the configuration service.
pub struct ConfigClient {
    pub(crate) options: ClientOptions,
    pub(crate) transport: Arc<dyn Transport>,
    resolver: Arc<dyn AddressResolver>,
    current_server_ip: OnceCell<String>,
    target: Mutex<Option<ConfigKey>>,
    content: watch::Sender<Option<String>>,
    pub(crate) subscription: SubscriptionFlags,
}

impl fmt::Debug for ConfigClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigClient")
            .field("options", &self.options)
            .field("current_server_ip", &self.current_server_ip.get())
            .field("target", &self.target())
            .field("subscription", &self.subscription_state())
            .finish()
    }
}

/// Builder wiring a [`ConfigClient`] to its collaborators.
///
/// Unset collaborators default to a [`ReqwestTransport`] built from the
/// options and a [`ServerListResolver`] over a fresh [`ServerListCache`].
pub struct ConfigClientBuilder {
    options: ClientOptions,
    transport: Option<Arc<dyn Transport>>,
    resolver: Option<Arc<dyn AddressResolver>>,
    cache: Option<ServerListCache>,
}

impl ConfigClientBuilder {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            transport: None,
            resolver: None,
            cache: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces discovery entirely; `cache` is ignored when set.
    pub fn resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Shares discovery results with other clients holding the same cache.
    pub fn cache(mut self, cache: ServerListCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<ConfigClient> {
        self.options.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.options.transport_options())?),
        };
        let resolver: Arc<dyn AddressResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(
                ServerListResolver::new(
                    self.options.endpoint.clone(),
                    Arc::clone(&transport),
                    self.cache.unwrap_or_default(),
                )
                .with_discovery_port(self.options.discovery_port),
            ),
        };
        let (content, _) = watch::channel(None);

        Ok(ConfigClient {
            options: self.options,
            transport,
            resolver,
            current_server_ip: OnceCell::new(),
            target: Mutex::new(None),
            content,
            subscription: SubscriptionFlags::default(),
        })
    }
}

impl ConfigClient {
    /// Builds a client with the default transport and a private server list cache.
    pub fn new(options: ClientOptions) -> Result<Self> {
        ConfigClientBuilder::new(options).build()
    }

    pub fn builder(options: ClientOptions) -> ConfigClientBuilder {
        ConfigClientBuilder::new(options)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    /// Address of the backend this client talks to, resolved on first use.
    ///
    /// Failed resolutions are not memoized; the next call retries discovery.
    pub async fn current_server_ip(&self) -> Result<&str> {
        let ip = self
            .current_server_ip
            .get_or_try_init(|| async {
                let ip = self.resolver.resolve_address(&Unit::Current).await?;
                debug!(server_ip = %ip, "acm current server selected");
                Ok::<_, AcmError>(ip)
            })
            .await?;
        Ok(ip.as_str())
    }

    /// The `(data_id, group)` pair the subscription loop watches.
    pub fn target(&self) -> Option<ConfigKey> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_target(&self, key: ConfigKey) {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    /// Last successfully fetched content.
    pub fn content(&self) -> Option<String> {
        self.content.borrow().clone()
    }

    /// Receiver notified every time a fetch stores new content.
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.content.subscribe()
    }

    /// URL of `path` on the current config server.
    pub async fn request_url(&self, path: &str) -> Result<String> {
        let ip = self.current_server_ip().await?;
        let (scheme, port) = self.options.scheme_and_port();
        Ok(format!("{scheme}://{ip}:{port}/diamond-server{path}"))
    }

    /// Signed headers for a request about `group`.
    ///
    /// Entries in `extra` are merged last and replace base headers of the same name.
    pub async fn build_headers(&self, group: &str, extra: Option<HeaderMap>) -> Result<HeaderMap> {
        self.current_server_ip().await?;

        let timestamp = now_millis();
        let signature = sign(
            &self.options.namespace,
            group,
            timestamp,
            &self.options.secret_key,
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_ACCESS_KEY,
            HeaderValue::from_str(&self.options.access_key).map_err(|_| {
                AcmError::Configuration("access key is not a valid header value".to_string())
            })?,
        );
        headers.insert(HEADER_TIMESTAMP, HeaderValue::from(timestamp));
        headers.insert(
            HEADER_SIGNATURE,
            HeaderValue::from_str(&signature).map_err(|_| {
                AcmError::Configuration("signature is not a valid header value".to_string())
            })?,
        );

        if let Some(extra) = extra {
            for (name, value) in extra.iter() {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(headers)
    }

    /// Fetches the config identified by `data_id`/`group` and caches it.
    ///
    /// The pair becomes the subscription target, replacing any previous one.
    pub async fn get_config(&self, data_id: &str, group: &str) -> Result<String> {
        let key = ConfigKey::new(data_id, group)?;
        self.set_target(key.clone());
        self.fetch(&key).await
    }

    pub(crate) async fn fetch(&self, key: &ConfigKey) -> Result<String> {
        let headers = self.build_headers(key.group(), None).await?;
        let url = self.request_url(CONFIG_PATH).await?;
        let request = HttpRequest::get(url)
            .with_headers(headers)
            .with_query("tenant", self.options.namespace.as_str())
            .with_query("dataId", key.data_id())
            .with_query("group", key.group());

        let content = self.transport.execute(request).await?.into_body()?;
        debug!(
            data_id = key.data_id(),
            group = key.group(),
            content_len = content.len(),
            "acm config fetched"
        );
        self.content.send_replace(Some(content.clone()));
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpError, HEADER_LONG_POLL_TIMEOUT};
    use crate::test_support::ScriptedTransport;
    use async_trait::async_trait;
    use reqwest::Method;

    fn client_with(transport: &Arc<ScriptedTransport>) -> ConfigClient {
        ConfigClient::builder(ClientOptions::new("example.com", "ns1", "ak", "sk"))
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    /// Resolver that always answers with the same address.
    struct FixedResolver(&'static str);

    #[async_trait]
    impl AddressResolver for FixedResolver {
        async fn resolve_address(&self, _unit: &Unit) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn construction_fails_fast_on_missing_credentials() {
        let err = ConfigClient::new(ClientOptions::new("example.com", "ns1", "ak", "")).unwrap_err();
        assert!(matches!(err, AcmError::Configuration(_)));
    }

    #[tokio::test]
    async fn get_config_fetches_and_caches_content() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(Method::GET, "/diamond", "10.0.0.1\n");
        transport.push_ok(Method::GET, CONFIG_PATH, "foo=bar");
        let client = client_with(&transport);

        assert_eq!(client.get_config("my.data", "DEFAULT_GROUP").await.unwrap(), "foo=bar");
        assert_eq!(client.content().as_deref(), Some("foo=bar"));
        assert_eq!(
            client.target(),
            Some(ConfigKey::new("my.data", "DEFAULT_GROUP").unwrap())
        );

        let fetches = transport.requests_to(Method::GET, CONFIG_PATH);
        assert_eq!(fetches.len(), 1);
        let fetch = &fetches[0];
        assert_eq!(fetch.url, "http://10.0.0.1:8080/diamond-server/config.co");
        assert_eq!(
            fetch.query,
            vec![
                ("tenant".to_string(), "ns1".to_string()),
                ("dataId".to_string(), "my.data".to_string()),
                ("group".to_string(), "DEFAULT_GROUP".to_string()),
            ]
        );
        assert_eq!(fetch.headers.get(HEADER_ACCESS_KEY).unwrap(), "ak");

        let timestamp: u64 = fetch
            .headers
            .get(HEADER_TIMESTAMP)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(
            fetch.headers.get(HEADER_SIGNATURE).unwrap(),
            sign("ns1", "DEFAULT_GROUP", timestamp, "sk").as_str()
        );
    }

    #[tokio::test]
    async fn discovery_requests_carry_no_auth_headers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(Method::GET, "/diamond", "10.0.0.1\n");
        transport.push_ok(Method::GET, CONFIG_PATH, "foo=bar");
        let client = client_with(&transport);
        client.get_config("my.data", "DEFAULT_GROUP").await.unwrap();

        let discovery = transport.requests_to(Method::GET, "/diamond");
        assert_eq!(discovery.len(), 1);
        assert!(discovery[0].headers.is_empty());
    }

    #[tokio::test]
    async fn invalid_identifiers_never_reach_the_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client_with(&transport);

        let err = client.get_config("bad/id", "DEFAULT_GROUP").await.unwrap_err();
        assert!(matches!(err, AcmError::InvalidIdentifier { kind: "data_id", .. }));
        let err = client.get_config("my.data", "bad group").await.unwrap_err();
        assert!(matches!(err, AcmError::InvalidIdentifier { kind: "group", .. }));

        assert!(transport.requests().is_empty());
        assert!(client.target().is_none());
    }

    #[tokio::test]
    async fn current_server_ip_is_memoized() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(Method::GET, "/diamond", "10.0.0.1\n");
        transport.push_ok(Method::GET, CONFIG_PATH, "one");
        transport.push_ok(Method::GET, CONFIG_PATH, "two");
        let client = client_with(&transport);

        client.get_config("my.data", "DEFAULT_GROUP").await.unwrap();
        client.get_config("my.data", "DEFAULT_GROUP").await.unwrap();
        assert_eq!(client.current_server_ip().await.unwrap(), "10.0.0.1");
        assert_eq!(transport.request_count(Method::GET, "/diamond"), 1);
        assert_eq!(client.content().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn failed_resolution_is_retried_on_next_call() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(Method::GET, "/diamond", "");
        transport.push_ok(Method::GET, "/diamond", "10.0.0.9\n");
        let client = client_with(&transport);

        assert!(matches!(
            client.current_server_ip().await,
            Err(AcmError::EmptyServerList { .. })
        ));
        assert_eq!(client.current_server_ip().await.unwrap(), "10.0.0.9");
    }

    #[tokio::test]
    async fn fetch_errors_propagate_and_keep_previous_content() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(Method::GET, "/diamond", "10.0.0.1\n");
        transport.push_ok(Method::GET, CONFIG_PATH, "foo=bar");
        transport.push(Method::GET, CONFIG_PATH, Err(HttpError::Timeout));
        transport.push_response(Method::GET, CONFIG_PATH, 403, "forbidden");
        let client = client_with(&transport);

        client.get_config("my.data", "DEFAULT_GROUP").await.unwrap();
        let err = client.get_config("my.data", "DEFAULT_GROUP").await.unwrap_err();
        assert!(matches!(err, AcmError::Transport(HttpError::Timeout)));
        let err = client.get_config("my.data", "DEFAULT_GROUP").await.unwrap_err();
        assert!(matches!(err, AcmError::Transport(HttpError::Status(403))));
        assert_eq!(client.content().as_deref(), Some("foo=bar"));
    }

    #[tokio::test]
    async fn build_headers_merges_extra_headers() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = ConfigClient::builder(ClientOptions::new("example.com", "ns1", "ak", "sk"))
            .transport(transport.clone())
            .resolver(Arc::new(FixedResolver("10.0.0.1")))
            .build()
            .unwrap();

        let headers = client.build_headers("DEFAULT_GROUP", None).await.unwrap();
        assert_eq!(headers.len(), 3);
        assert!(headers.contains_key(HEADER_ACCESS_KEY));
        assert!(headers.contains_key(HEADER_TIMESTAMP));
        assert!(headers.contains_key(HEADER_SIGNATURE));

        let mut extra = HeaderMap::new();
        extra.insert(HEADER_LONG_POLL_TIMEOUT, HeaderValue::from(30000u64));
        extra.insert(HEADER_ACCESS_KEY, HeaderValue::from_static("override"));
        let headers = client
            .build_headers("DEFAULT_GROUP", Some(extra))
            .await
            .unwrap();
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get(HEADER_LONG_POLL_TIMEOUT).unwrap(), "30000");
        assert_eq!(headers.get(HEADER_ACCESS_KEY).unwrap(), "override");

        // The fixed resolver never touches the transport.
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn ssl_option_switches_request_url() {
        let transport = Arc::new(ScriptedTransport::new());
        let options = ClientOptions {
            use_ssl: true,
            ..ClientOptions::new("example.com", "ns1", "ak", "sk")
        };
        let client = ConfigClient::builder(options)
            .transport(transport)
            .resolver(Arc::new(FixedResolver("10.0.0.1")))
            .build()
            .unwrap();

        assert_eq!(
            client.request_url(CONFIG_PATH).await.unwrap(),
            "https://10.0.0.1:443/diamond-server/config.co"
        );
    }

    #[tokio::test]
    async fn watch_receivers_observe_fetches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(Method::GET, "/diamond", "10.0.0.1\n");
        transport.push_ok(Method::GET, CONFIG_PATH, "foo=bar");
        let client = client_with(&transport);
        let mut rx = client.watch();
        assert!(rx.borrow().is_none());

        client.get_config("my.data", "DEFAULT_GROUP").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("foo=bar"));
    }
}
