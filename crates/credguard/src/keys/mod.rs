//! Key selection
//!
//! Validators never hold key material directly. They ask a selector for the
//! candidate keys matching a token header and try each candidate in turn.
//! Selectors are the only place validation may suspend (remote fetches).
//!
//! - `jwk_set` - JWK sources and the stock JWS / JWE selectors
//! - `remote` - cached, rate-limited remote JWK set
//! - `retriever` - bounded HTTP resource retrieval

pub mod jwk_set;
pub mod remote;
pub mod retriever;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use credguard_core::Result;

use crate::jose::{
    EncryptionMethod, JoseHeader, JweAlgorithm, JweDecryptionKey, JwsAlgorithm, JwsVerificationKey,
};

pub use jwk_set::{
    ImmutableJwkSet, JwkSource, JwsVerificationKeySelector, SecretKeySelector, StaticJweKeySelector,
    jwk_matches, select_from_jwks,
};
pub use remote::RemoteJwkSet;
pub use retriever::{HttpResourceRetriever, Resource, ResourceRetriever, RetrieveError};

/// Supplies candidate keys for JWS verification
///
/// A selector is bound to exactly one algorithm at construction time; tokens
/// declaring any other algorithm are rejected before selection.
#[async_trait]
pub trait JwsKeySelector: Send + Sync {
    /// The only algorithm this selector accepts
    fn expected_algorithm(&self) -> JwsAlgorithm;

    /// Candidate keys for a token with this header, in preference order
    ///
    /// `now` is the validation instant; keys with an expiry are judged against
    /// it. An empty list means no key matched.
    async fn select_keys(
        &self,
        header: &JoseHeader,
        now: DateTime<Utc>,
    ) -> Result<Vec<JwsVerificationKey>>;
}

/// Supplies candidate keys for JWE decryption
#[async_trait]
pub trait JweKeySelector: Send + Sync {
    /// The only key management algorithm this selector accepts
    fn expected_algorithm(&self) -> JweAlgorithm;

    /// The only content encryption method this selector accepts
    fn expected_encryption_method(&self) -> EncryptionMethod;

    /// Candidate keys for a token with this header, in preference order
    async fn select_keys(&self, header: &JoseHeader) -> Result<Vec<JweDecryptionKey>>;
}
