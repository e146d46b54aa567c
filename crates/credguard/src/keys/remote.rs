//! Remote JWK set with caching
//!
//! The key set is fetched through a [`ResourceRetriever`] and cached for a TTL
//! (default 10 minutes). When a token names a `kid` the cached set does not
//! contain, the set is re-fetched, at most once per minimum refresh interval
//! (default 5 seconds), so rotated keys are picked up without letting a flood
//! of unknown `kid`s hammer the issuer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use credguard_core::{Error, Result};

use super::jwk_set::JwkSource;
use super::retriever::{HttpResourceRetriever, ResourceRetriever};
use crate::config::RemoteJwkSetConfig;

/// JWK set cache entry with metadata
#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// JWK set fetched from a URL
#[derive(Clone)]
pub struct RemoteJwkSet {
    url: Url,
    retriever: Arc<dyn ResourceRetriever>,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    last_refresh: Arc<RwLock<Option<Instant>>>,
}

impl std::fmt::Debug for RemoteJwkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteJwkSet")
            .field("url", &self.url.as_str())
            .field("cache_ttl", &self.cache_ttl)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish_non_exhaustive()
    }
}

impl RemoteJwkSet {
    /// Create a remote set with a default HTTP retriever and default cache settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URL is not HTTPS (plain HTTP is
    /// allowed for loopback hosts only) or the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let retriever = HttpResourceRetriever::new()?;
        Self::with_retriever(url, Arc::new(retriever), &RemoteJwkSetConfig::default())
    }

    /// Create a remote set with an explicit retriever and cache settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URL is not HTTPS (plain HTTP is
    /// allowed for loopback hosts only).
    pub fn with_retriever(
        url: Url,
        retriever: Arc<dyn ResourceRetriever>,
        config: &RemoteJwkSetConfig,
    ) -> Result<Self> {
        validate_url(&url)?;
        Ok(Self {
            url,
            retriever,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            min_refresh_interval: Duration::from_millis(config.min_refresh_interval_ms),
            last_refresh: Arc::new(RwLock::new(None)),
        })
    }

    /// Build from configuration, including the retriever
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unusable URL or HTTP client.
    pub fn from_config(url: Url, config: &RemoteJwkSetConfig) -> Result<Self> {
        let retriever = HttpResourceRetriever::with_config(&config.retriever)?;
        Self::with_retriever(url, Arc::new(retriever), config)
    }

    /// Key set URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the JWK set (from cache or fetched if needed)
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySource`] if the endpoint is unreachable, answers with
    /// an error status, exceeds the size limit, or returns something other than
    /// a JWK set.
    pub async fn get(&self) -> Result<JwkSet> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.is_valid()
            {
                debug!(url = %self.url, "Using cached JWK set");
                return Ok(cached.jwks.clone());
            }
        }

        self.fetch_and_cache().await
    }

    /// Force a refresh, subject to the minimum refresh interval
    ///
    /// When called again within the interval, the cached set is returned.
    ///
    /// # Errors
    ///
    /// Same as [`RemoteJwkSet::get`].
    pub async fn refresh(&self) -> Result<JwkSet> {
        // Check and stamp under one guard so concurrent misses refetch once
        let rate_limited = {
            let mut last_refresh = self.last_refresh.write().await;
            match *last_refresh {
                Some(last) if last.elapsed() < self.min_refresh_interval => Some(last.elapsed()),
                _ => {
                    *last_refresh = Some(Instant::now());
                    None
                }
            }
        };

        if let Some(since_last) = rate_limited {
            warn!(
                url = %self.url,
                since_last_ms = since_last.as_millis(),
                "JWK set refresh rate limited, using cache"
            );
            return self.get().await;
        }

        self.fetch().await
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet> {
        {
            let mut last_refresh = self.last_refresh.write().await;
            *last_refresh = Some(Instant::now());
        }
        self.fetch().await
    }

    async fn fetch(&self) -> Result<JwkSet> {
        info!(url = %self.url, "Fetching JWK set");

        let resource = self.retriever.retrieve(&self.url).await?;
        let jwks: JwkSet = serde_json::from_slice(&resource.content).map_err(|e| {
            warn!(url = %self.url, error = %e, "Failed to parse JWK set");
            Error::KeySource(format!("invalid JWK set: {e}"))
        })?;

        info!(url = %self.url, key_count = jwks.keys.len(), "Fetched JWK set");

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedJwks {
                jwks: jwks.clone(),
                cached_at: Instant::now(),
                ttl: self.cache_ttl,
            });
        }

        Ok(jwks)
    }

    /// Drop the cached set
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        debug!(url = %self.url, "JWK set cache cleared");
    }
}

#[async_trait]
impl JwkSource for RemoteJwkSet {
    async fn jwk_set(&self, key_id: Option<&str>) -> Result<JwkSet> {
        let jwks = self.get().await?;
        match key_id {
            Some(kid) if jwks.find(kid).is_none() => {
                debug!(url = %self.url, key_id = kid, "Unknown kid, refreshing JWK set");
                self.refresh().await
            }
            _ => Ok(jwks),
        }
    }
}

fn validate_url(url: &Url) -> Result<()> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(url) => Ok(()),
        _ => Err(Error::Configuration(format!(
            "JWK set URL must use HTTPS (HTTP only allowed for loopback): {url}"
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
