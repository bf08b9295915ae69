// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backend server discovery.
//!
//! The discovery endpoint publishes, per unit, a newline separated list of
//! backend hosts. [`ServerListResolver`] fetches that list on first use, keeps
//! it in a [`ServerListCache`] and hands out a random member on every lookup.
//! The cache is an explicit object: share one instance between clients to
//! reuse discovery results, or give each client its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{AcmError, Result};
use crate::http::{HttpRequest, Transport};

/// Port the discovery service listens on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 8080;

const CURRENT_UNIT_LABEL: &str = "CURRENT_UNIT";

/// Named partition of the backend fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    /// The partition the caller belongs to.
    #[default]
    Current,
    Named(String),
}

impl Unit {
    pub fn named(name: impl Into<String>) -> Self {
        Unit::Named(name.into())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Current => f.write_str(CURRENT_UNIT_LABEL),
            Unit::Named(name) => f.write_str(name),
        }
    }
}

/// Unit → server list map shared by every resolver holding a clone.
///
/// Entries never expire; call [`ServerListCache::invalidate`] or
/// [`ServerListCache::clear`] to force rediscovery. Concurrent population of
/// the same unit is last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct ServerListCache {
    inner: Arc<RwLock<HashMap<Unit, Vec<String>>>>,
}

impl ServerListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, unit: &Unit) -> Option<Vec<String>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(unit).cloned()
    }

    pub fn insert(&self, unit: Unit, servers: Vec<String>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(unit, servers);
    }

    /// Drops the cached list for `unit`, returning it.
    pub fn invalidate(&self, unit: &Unit) -> Option<Vec<String>> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(unit)
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Narrow interface the config client uses to find a backend.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Returns one backend host for `unit`.
    async fn resolve_address(&self, unit: &Unit) -> Result<String>;
}

/// Resolves backend addresses through the discovery endpoint.
pub struct ServerListResolver {
    endpoint: String,
    discovery_port: u16,
    cache: ServerListCache,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for ServerListResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerListResolver")
            .field("endpoint", &self.endpoint)
            .field("discovery_port", &self.discovery_port)
            .field("cached_units", &self.cache.len())
            .finish()
    }
}

impl ServerListResolver {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        cache: ServerListCache,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            cache,
            transport,
        }
    }

    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache(&self) -> &ServerListCache {
        &self.cache
    }

    /// Discovery URL for `unit`.
    pub fn request_server_list_url(&self, unit: &Unit) -> String {
        match unit {
            Unit::Current => format!(
                "http://{}:{}/diamond-server/diamond",
                self.endpoint, self.discovery_port
            ),
            Unit::Named(name) => format!(
                "http://{}:{}/diamond-server/diamond-unit-{}?nofix=1",
                self.endpoint, self.discovery_port, name
            ),
        }
    }

    /// Fetches the host list for `unit` from the discovery endpoint, bypassing the cache.
    pub async fn fetch_server_list(&self, unit: &Unit) -> Result<Vec<String>> {
        let url = self.request_server_list_url(unit);
        let body = self
            .transport
            .execute(HttpRequest::get(url))
            .await?
            .into_body()?;
        if body.is_empty() {
            return Err(AcmError::EmptyServerList { unit: unit.clone() });
        }
        let servers = parse_server_list(&body);
        debug!(unit = %unit, servers = ?servers, "acm server list discovered");
        Ok(servers)
    }
}

#[async_trait]
impl AddressResolver for ServerListResolver {
    async fn resolve_address(&self, unit: &Unit) -> Result<String> {
        let servers = match self.cache.get(unit) {
            Some(servers) if !servers.is_empty() => servers,
            _ => {
                let servers = self.fetch_server_list(unit).await?;
                if servers.is_empty() {
                    return Err(AcmError::NotFound { unit: unit.clone() });
                }
                self.cache.insert(unit.clone(), servers.clone());
                servers
            }
        };
        pick_random(&servers).ok_or_else(|| AcmError::NotFound { unit: unit.clone() })
    }
}

/// Splits a discovery body into host entries, dropping blank lines.
pub fn parse_server_list(body: &str) -> Vec<String> {
    body.split('\n')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_owned)
        .collect()
}

fn pick_random(servers: &[String]) -> Option<String> {
    servers.choose(&mut rand::thread_rng()).cloned()
}
