//! JWS signature verification
//!
//! Only the signature is checked here. `jsonwebtoken`'s own claim checks are
//! switched off; expiration, audience and friends belong to the claims
//! verifier.

use std::collections::HashSet;

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use credguard_core::{Error, Result, Secret};

use super::token::SignedJwt;

/// A candidate signature verification key
#[derive(Clone)]
pub struct JwsVerificationKey {
    key: DecodingKey,
    key_id: Option<String>,
}

impl JwsVerificationKey {
    /// Wrap an existing decoding key
    pub fn new(key: DecodingKey, key_id: Option<String>) -> Self {
        Self { key, key_id }
    }

    /// Build from a JSON Web Key
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySource`] if the JWK cannot be turned into a key.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| Error::KeySource(format!("unusable JWK: {e}")))?;
        Ok(Self {
            key,
            key_id: jwk.common.key_id.clone(),
        })
    }

    /// HMAC key from a shared secret
    pub fn from_secret(secret: &Secret) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.expose_bytes()),
            key_id: None,
        }
    }

    /// Key identifier, if known
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl std::fmt::Debug for JwsVerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwsVerificationKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Check the signature of `jwt` against a single key
///
/// Returns `Ok(false)` when the signature does not verify with this key.
///
/// # Errors
///
/// Returns [`Error::UnsupportedAlgorithm`] for algorithms with no verifier.
pub fn verify_signature(jwt: &SignedJwt, key: &JwsVerificationKey) -> Result<bool> {
    let algorithm = jwt.algorithm();
    let jwt_algorithm = algorithm
        .to_jsonwebtoken()
        .ok_or_else(|| Error::UnsupportedAlgorithm(algorithm.to_string()))?;

    let mut validation = Validation::new(jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    match decode::<serde_json::Value>(jwt.as_str(), key.decoding_key(), &validation) {
        Ok(_) => Ok(true),
        Err(e) => {
            debug!(
                algorithm = %algorithm,
                key_id = ?key.key_id(),
                error = %e,
                "JWS signature did not verify with candidate key"
            );
            Ok(false)
        }
    }
}

/// Try every candidate in order, returning the first key that verifies
pub(crate) fn verify_with_any<'k>(
    jwt: &SignedJwt,
    candidates: &'k [JwsVerificationKey],
) -> Result<Option<&'k JwsVerificationKey>> {
    for candidate in candidates {
        if verify_signature(jwt, candidate)? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
