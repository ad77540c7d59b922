//! Issuer key sets: discovery, fetch and a per-issuer cache.
//!
//! Freshness is a fixed TTL per issuer. Reads of a fresh entry only take a
//! read lock; a stale or missing entry is refreshed under that issuer's own
//! refresh lock, so concurrent requests for one issuer share a single fetch
//! and different issuers never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("invalid key set url: {0}")]
    Url(#[from] url::ParseError),
    #[error("key set request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("key set endpoint {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Source of an issuer's published signing keys.
#[async_trait]
pub trait KeySetFetcher: Send + Sync + 'static {
    async fn fetch(&self, issuer: &Url) -> Result<JwkSet, KeySetError>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: Option<String>,
}

/// Fetches key sets over HTTP.
///
/// Follows `<issuer>/.well-known/openid-configuration` to its `jwks_uri` and
/// falls back to `<issuer>/.well-known/jwks.json` when discovery fails.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new() -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn discovery_url(issuer: &Url) -> Result<Url, KeySetError> {
        well_known(issuer, "openid-configuration")
    }

    pub fn fallback_url(issuer: &Url) -> Result<Url, KeySetError> {
        well_known(issuer, "jwks.json")
    }

    async fn discover(&self, issuer: &Url) -> Result<Url, KeySetError> {
        let discovery = Self::discovery_url(issuer)?;

        match self.client.get(discovery.clone()).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<DiscoveryDocument>().await {
                Ok(DiscoveryDocument {
                    jwks_uri: Some(uri),
                }) => match Url::parse(&uri) {
                    Ok(url) => return Ok(url),
                    Err(e) => warn!(%discovery, error = %e, "discovered jwks_uri is not a url"),
                },
                Ok(_) => warn!(%discovery, "discovery document has no jwks_uri"),
                Err(e) => warn!(%discovery, error = %e, "unreadable discovery document"),
            },
            Ok(resp) => warn!(%discovery, status = %resp.status(), "discovery request refused"),
            Err(e) => warn!(%discovery, error = %e, "discovery request failed"),
        }

        Self::fallback_url(issuer)
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, issuer: &Url) -> Result<JwkSet, KeySetError> {
        let jwks_url = self.discover(issuer).await?;
        debug!(%issuer, %jwks_url, "fetching key set");

        let resp = self.client.get(jwks_url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(KeySetError::Status {
                url: jwks_url.to_string(),
                status: resp.status(),
            });
        }

        Ok(resp.json::<JwkSet>().await?)
    }
}

fn well_known(issuer: &Url, name: &str) -> Result<Url, KeySetError> {
    let base = issuer.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/.well-known/{name}"))?)
}

#[derive(Debug)]
struct CachedKeySet {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct IssuerSlot {
    entry: RwLock<Option<CachedKeySet>>,
    refresh: Mutex<()>,
}

impl IssuerSlot {
    async fn fresh(&self, ttl: Duration) -> Option<Arc<JwkSet>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < ttl)
            .map(|cached| Arc::clone(&cached.keys))
    }
}

/// Key sets keyed by issuer URL, each entry valid for `ttl`.
pub struct KeySetCache {
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    slots: RwLock<HashMap<String, Arc<IssuerSlot>>>,
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl KeySetCache {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Keys for `issuer`, fetched only if the cached copy is missing or stale.
    pub async fn get(&self, issuer: &Url) -> Result<Arc<JwkSet>, KeySetError> {
        let slot = self.slot(issuer.as_str()).await;

        if let Some(keys) = slot.fresh(self.ttl).await {
            return Ok(keys);
        }

        let _refreshing = slot.refresh.lock().await;
        // Another request may have refreshed while we waited.
        if let Some(keys) = slot.fresh(self.ttl).await {
            debug!(%issuer, "key set refreshed by concurrent request");
            return Ok(keys);
        }

        let keys = match self.fetcher.fetch(issuer).await {
            Ok(keys) => Arc::new(keys),
            Err(e) => {
                // Issuers that never produced a key set do not keep a slot.
                if slot.entry.read().await.is_none() {
                    self.forget(issuer.as_str(), &slot).await;
                }
                return Err(e);
            }
        };
        info!(%issuer, key_count = keys.keys.len(), "key set cached");

        *slot.entry.write().await = Some(CachedKeySet {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn slot(&self, issuer: &str) -> Arc<IssuerSlot> {
        if let Some(slot) = self.slots.read().await.get(issuer) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(issuer.to_string()).or_default())
    }

    async fn forget(&self, issuer: &str, slot: &Arc<IssuerSlot>) {
        let mut slots = self.slots.write().await;
        if slots.get(issuer).is_some_and(|cur| Arc::ptr_eq(cur, slot)) {
            slots.remove(issuer);
        }
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }
}
