//! Bounded resource retrieval
//!
//! Remote key material is fetched with explicit connect and read timeouts and
//! a hard ceiling on the response size, enforced while the body streams in so
//! an oversized response is never fully buffered.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use credguard_core::Error;

use crate::config::RetrieverConfig;

/// Retrieval failures
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// HTTP client could not be built
    #[error("HTTP client configuration failed: {0}")]
    Client(String),

    /// Request failed (connect, timeout, TLS, ...)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success status code
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Response size limit exceeded
    #[error("Resource exceeds the size limit of {limit} bytes")]
    ResourceTooLarge {
        /// Configured ceiling
        limit: usize,
    },
}

impl From<RetrieveError> for Error {
    fn from(error: RetrieveError) -> Self {
        match error {
            RetrieveError::Client(msg) => Error::Configuration(msg),
            other => Error::KeySource(other.to_string()),
        }
    }
}

/// A retrieved resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Raw body
    pub content: Vec<u8>,
    /// `Content-Type` header, if sent
    pub content_type: Option<String>,
}

/// Fetches a resource by URL
#[async_trait]
pub trait ResourceRetriever: Send + Sync {
    /// Retrieve the resource at `url`
    async fn retrieve(&self, url: &Url) -> Result<Resource, RetrieveError>;
}

/// `reqwest`-based retriever with timeouts and a size ceiling
#[derive(Debug, Clone)]
pub struct HttpResourceRetriever {
    client: reqwest::Client,
    size_limit: usize,
}

impl HttpResourceRetriever {
    /// Create a retriever with the default limits
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::Client`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, RetrieveError> {
        Self::with_config(&RetrieverConfig::default())
    }

    /// Create a retriever with custom limits
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::Client`] if the HTTP client cannot be built.
    pub fn with_config(config: &RetrieverConfig) -> Result<Self, RetrieveError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.read_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RetrieveError::Client(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            size_limit: config.size_limit_bytes,
        })
    }

    /// Configured size ceiling in bytes
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }
}

#[async_trait]
impl ResourceRetriever for HttpResourceRetriever {
    async fn retrieve(&self, url: &Url) -> Result<Resource, RetrieveError> {
        debug!(url = %url, "Retrieving remote resource");

        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Resource request failed");
            RetrieveError::Http(e.to_string())
        })?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Resource endpoint returned error status");
            return Err(RetrieveError::Status(response.status().as_u16()));
        }

        let limit = self.size_limit;
        if let Some(content_length) = response.content_length()
            && content_length > limit as u64
        {
            warn!(url = %url, content_length, limit, "Resource too large");
            return Err(RetrieveError::ResourceTooLarge { limit });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut content = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RetrieveError::Http(e.to_string()))?
        {
            if content.len() + chunk.len() > limit {
                warn!(url = %url, limit, "Resource exceeded size limit while streaming");
                return Err(RetrieveError::ResourceTooLarge { limit });
            }
            content.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = content.len(), "Retrieved remote resource");
        Ok(Resource {
            content,
            content_type,
        })
    }
}
