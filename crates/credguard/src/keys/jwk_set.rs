//! JWK sources and the stock selectors

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, PublicKeyUse};
use tracing::{debug, warn};

use credguard_core::{Error, Result, Secret};

use super::{JweKeySelector, JwsKeySelector};
use crate::jose::{
    AlgorithmFamily, EncryptionMethod, JoseHeader, JweAlgorithm, JweDecryptionKey, JwsAlgorithm,
    JwsVerificationKey,
};

/// Source of a JSON Web Key set
#[async_trait]
pub trait JwkSource: Send + Sync {
    /// Current key set
    ///
    /// `key_id` is a hint: a caching source may refresh when no key carries it.
    async fn jwk_set(&self, key_id: Option<&str>) -> Result<JwkSet>;
}

#[async_trait]
impl<T: JwkSource + ?Sized> JwkSource for Arc<T> {
    async fn jwk_set(&self, key_id: Option<&str>) -> Result<JwkSet> {
        (**self).jwk_set(key_id).await
    }
}

/// Fixed, local JWK set
#[derive(Debug, Clone)]
pub struct ImmutableJwkSet {
    jwks: JwkSet,
}

impl ImmutableJwkSet {
    pub fn new(jwks: JwkSet) -> Self {
        Self { jwks }
    }

    /// Parse a JWK set document
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if `json` is not a JWK set.
    pub fn from_json(json: &str) -> Result<Self> {
        let jwks = serde_json::from_str(json)
            .map_err(|e| Error::malformed(format!("invalid JWK set: {e}")))?;
        Ok(Self { jwks })
    }

    pub fn keys(&self) -> &[Jwk] {
        &self.jwks.keys
    }
}

#[async_trait]
impl JwkSource for ImmutableJwkSet {
    async fn jwk_set(&self, _key_id: Option<&str>) -> Result<JwkSet> {
        Ok(self.jwks.clone())
    }
}

/// Whether a JWK is usable for `algorithm` under a header carrying `key_id`
///
/// Checks key type (and curve) against the algorithm family, `use` (absent or
/// `sig`), `alg` (absent or equal) and `kid` (when the header names one).
pub fn jwk_matches(jwk: &Jwk, algorithm: JwsAlgorithm, key_id: Option<&str>) -> bool {
    let type_matches = match (&jwk.algorithm, algorithm) {
        (AlgorithmParameters::OctetKey(_), alg) => alg.family() == AlgorithmFamily::Hmac,
        (AlgorithmParameters::RSA(_), alg) => alg.family() == AlgorithmFamily::Rsa,
        (AlgorithmParameters::EllipticCurve(params), JwsAlgorithm::ES256) => {
            params.curve == EllipticCurve::P256
        }
        (AlgorithmParameters::EllipticCurve(params), JwsAlgorithm::ES384) => {
            params.curve == EllipticCurve::P384
        }
        (AlgorithmParameters::EllipticCurve(params), JwsAlgorithm::ES512) => {
            params.curve == EllipticCurve::P521
        }
        (AlgorithmParameters::OctetKeyPair(params), JwsAlgorithm::EdDSA) => {
            params.curve == EllipticCurve::Ed25519
        }
        _ => false,
    };
    if !type_matches {
        return false;
    }

    let use_matches = matches!(
        jwk.common.public_key_use,
        None | Some(PublicKeyUse::Signature)
    );
    let alg_matches = jwk
        .common
        .key_algorithm
        .as_ref()
        .is_none_or(|key_alg| key_algorithm_name(key_alg).as_deref() == Some(algorithm.as_str()));
    let kid_matches = match key_id {
        Some(kid) => jwk.common.key_id.as_deref() == Some(kid),
        None => true,
    };

    use_matches && alg_matches && kid_matches
}

fn key_algorithm_name(key_alg: &jsonwebtoken::jwk::KeyAlgorithm) -> Option<String> {
    serde_json::to_value(key_alg)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
}

/// Convert every JWK in `jwks` usable under `header` into a verification key
///
/// JWKs that match but cannot be converted are skipped with a warning.
pub fn select_from_jwks(
    jwks: &JwkSet,
    algorithm: JwsAlgorithm,
    header: &JoseHeader,
) -> Vec<JwsVerificationKey> {
    jwks.keys
        .iter()
        .filter(|jwk| jwk_matches(jwk, algorithm, header.kid.as_deref()))
        .filter_map(|jwk| match JwsVerificationKey::from_jwk(jwk) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(key_id = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                None
            }
        })
        .collect()
}

/// JWS selector over a JWK source, bound to one algorithm
#[derive(Debug, Clone)]
pub struct JwsVerificationKeySelector<S> {
    algorithm: JwsAlgorithm,
    source: S,
}

impl<S: JwkSource> JwsVerificationKeySelector<S> {
    /// Create a selector
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for `none`.
    pub fn new(algorithm: JwsAlgorithm, source: S) -> Result<Self> {
        if algorithm == JwsAlgorithm::None {
            return Err(Error::Configuration(
                "a key selector cannot be bound to 'none'".to_string(),
            ));
        }
        Ok(Self { algorithm, source })
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: JwkSource> JwsKeySelector for JwsVerificationKeySelector<S> {
    fn expected_algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    async fn select_keys(
        &self,
        header: &JoseHeader,
        _now: DateTime<Utc>,
    ) -> Result<Vec<JwsVerificationKey>> {
        let jwks = self.source.jwk_set(header.kid.as_deref()).await?;
        let keys = select_from_jwks(&jwks, self.algorithm, header);
        debug!(
            algorithm = %self.algorithm,
            key_id = ?header.kid,
            candidates = keys.len(),
            "Selected JWS verification keys"
        );
        Ok(keys)
    }
}

/// HMAC selector over shared secrets
///
/// Expired secrets are never offered as candidates.
#[derive(Debug, Clone)]
pub struct SecretKeySelector {
    algorithm: JwsAlgorithm,
    secrets: Vec<Secret>,
}

impl SecretKeySelector {
    /// Create a selector
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `algorithm` is not an HMAC algorithm
    /// or `secrets` is empty.
    pub fn new(algorithm: JwsAlgorithm, secrets: Vec<Secret>) -> Result<Self> {
        if algorithm.family() != AlgorithmFamily::Hmac {
            return Err(Error::Configuration(format!(
                "{algorithm} is not an HMAC algorithm"
            )));
        }
        if secrets.is_empty() {
            return Err(Error::Configuration(
                "at least one shared secret is required".to_string(),
            ));
        }
        Ok(Self { algorithm, secrets })
    }

    /// Secrets not yet expired at `now`
    pub fn usable_secrets(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Secret> {
        self.secrets.iter().filter(move |s| !s.is_expired_at(now))
    }
}

#[async_trait]
impl JwsKeySelector for SecretKeySelector {
    fn expected_algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    async fn select_keys(
        &self,
        _header: &JoseHeader,
        now: DateTime<Utc>,
    ) -> Result<Vec<JwsVerificationKey>> {
        Ok(self
            .usable_secrets(now)
            .map(JwsVerificationKey::from_secret)
            .collect())
    }
}

/// JWE selector over a local key list, bound to one (alg, enc) pair
#[derive(Debug, Clone)]
pub struct StaticJweKeySelector {
    algorithm: JweAlgorithm,
    encryption: EncryptionMethod,
    keys: Vec<JweDecryptionKey>,
}

impl StaticJweKeySelector {
    /// Create a selector
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `keys` is empty or a key cannot
    /// serve `algorithm`.
    pub fn new(
        algorithm: JweAlgorithm,
        encryption: EncryptionMethod,
        keys: Vec<JweDecryptionKey>,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::Configuration(
                "at least one decryption key is required".to_string(),
            ));
        }
        if let Some(key) = keys.iter().find(|key| !key.supports(algorithm)) {
            return Err(Error::Configuration(format!(
                "decryption key {:?} cannot be used with {algorithm}",
                key.key_id()
            )));
        }
        Ok(Self {
            algorithm,
            encryption,
            keys,
        })
    }
}

#[async_trait]
impl JweKeySelector for StaticJweKeySelector {
    fn expected_algorithm(&self) -> JweAlgorithm {
        self.algorithm
    }

    fn expected_encryption_method(&self) -> EncryptionMethod {
        self.encryption
    }

    async fn select_keys(&self, header: &JoseHeader) -> Result<Vec<JweDecryptionKey>> {
        Ok(self
            .keys
            .iter()
            .filter(|key| match (header.kid.as_deref(), key.key_id()) {
                (Some(wanted), Some(have)) => wanted == have,
                _ => true,
            })
            .cloned()
            .collect())
    }
}
