//! Validator configuration types
//!
//! Every struct deserializes from JSON/TOML-like sources with sensible
//! defaults. Secrets are read into [`SecretString`] and never serialized back.

use jsonwebtoken::jwk::JwkSet;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use credguard_core::{ClientId, Issuer};

use crate::client_auth::ClientAuthMethod;
use crate::jose::JwsAlgorithm;

/// Remote resource retrieval limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Connect timeout in milliseconds (default: 500)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds (default: 500)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Maximum response size in bytes (default: 51 200)
    #[serde(default = "default_size_limit_bytes")]
    pub size_limit_bytes: usize,
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_size_limit_bytes() -> usize {
    50 * 1024
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            size_limit_bytes: default_size_limit_bytes(),
        }
    }
}

/// Remote JWK set caching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJwkSetConfig {
    /// Cache TTL in seconds (default: 600)
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Minimum interval between forced refreshes in milliseconds (default: 5000)
    #[serde(default = "default_min_refresh_interval_ms")]
    pub min_refresh_interval_ms: u64,
    /// Retrieval limits
    #[serde(default)]
    pub retriever: RetrieverConfig,
}

fn default_cache_ttl_seconds() -> u64 {
    600
}

fn default_min_refresh_interval_ms() -> u64 {
    5_000
}

impl Default for RemoteJwkSetConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl_seconds(),
            min_refresh_interval_ms: default_min_refresh_interval_ms(),
            retriever: RetrieverConfig::default(),
        }
    }
}

/// Identity-token validator configuration
///
/// `algorithm` decides the key source: HMAC algorithms use `client_secret`,
/// every other algorithm uses the JWK set at `jwks_uri`, and `none` builds a
/// validator for unsecured tokens only.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenValidatorConfig {
    /// Expected `iss`
    pub issuer: Issuer,
    /// This relying party's client identifier
    pub client_id: ClientId,
    /// Expected JWS algorithm
    pub algorithm: JwsAlgorithm,
    /// Issuer JWK set URL (asymmetric algorithms)
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    /// Client secret (HMAC algorithms)
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    /// Remote JWK set caching
    #[serde(default)]
    pub jwks: RemoteJwkSetConfig,
    /// Clock skew tolerance in seconds (default: 60)
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,
    /// Audiences accepted in addition to the client id
    #[serde(default)]
    pub additional_audiences: Vec<String>,
    /// Maximum authentication age in seconds; requires `auth_time` when set
    #[serde(default)]
    pub max_auth_age_seconds: Option<u64>,
}

fn default_clock_skew_seconds() -> u64 {
    credguard_core::DEFAULT_CLOCK_SKEW_SECS
}

/// A client known to the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredClient {
    /// Client identifier
    pub client_id: ClientId,
    /// Registered `token_endpoint_auth_method`
    pub method: ClientAuthMethod,
    /// Shared secrets (secret-based and `client_secret_jwt` methods)
    #[serde(default)]
    pub secrets: Vec<SecretString>,
    /// Public keys (`private_key_jwt`)
    #[serde(default)]
    pub jwks: Option<JwkSet>,
}

/// Client authentication verifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientAuthConfig {
    /// Accepted assertion audiences (token endpoint URL, issuer)
    pub expected_audience: Vec<String>,
    /// Clock skew tolerance in seconds (default: 60)
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,
    /// Registered clients
    #[serde(default)]
    pub clients: Vec<RegisteredClient>,
}
