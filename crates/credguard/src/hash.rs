//! Access token / authorization code hash binding (`at_hash`, `c_hash`)
//!
//! The hash is the base64url (unpadded) encoding of the left-most half of the
//! digest of the ASCII value, using the hash function of the identity token's
//! JWS algorithm.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use tracing::warn;

use credguard_core::{Error, Result};

use crate::jose::JwsAlgorithm;

/// A computed or claimed `at_hash` / `c_hash` value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashClaim(String);

impl HashClaim {
    /// Wrap a claimed value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for HashClaim {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for HashClaim {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Compute the hash claim of `value` under `algorithm`
///
/// Returns `None` for algorithms without an associated hash function (`none`).
pub fn compute(value: &[u8], algorithm: JwsAlgorithm) -> Option<HashClaim> {
    let digest: Vec<u8> = match algorithm {
        JwsAlgorithm::HS256 | JwsAlgorithm::RS256 | JwsAlgorithm::PS256 | JwsAlgorithm::ES256 => {
            Sha256::digest(value).to_vec()
        }
        JwsAlgorithm::HS384 | JwsAlgorithm::RS384 | JwsAlgorithm::PS384 | JwsAlgorithm::ES384 => {
            Sha384::digest(value).to_vec()
        }
        JwsAlgorithm::HS512
        | JwsAlgorithm::RS512
        | JwsAlgorithm::PS512
        | JwsAlgorithm::ES512
        | JwsAlgorithm::EdDSA => Sha512::digest(value).to_vec(),
        JwsAlgorithm::None => return None,
    };
    let left_half = &digest[..digest.len() / 2];
    Some(HashClaim(URL_SAFE_NO_PAD.encode(left_half)))
}

/// Check that `claimed` binds `value` under `algorithm`
///
/// # Errors
///
/// Returns [`Error::InvalidHash`] if no hash can be computed for the algorithm
/// or the values differ.
pub fn validate(value: &[u8], algorithm: JwsAlgorithm, claimed: &HashClaim) -> Result<()> {
    let Some(expected) = compute(value, algorithm) else {
        warn!(algorithm = %algorithm, "No hash function for algorithm");
        return Err(Error::InvalidHash);
    };
    if bool::from(expected.as_str().as_bytes().ct_eq(claimed.as_str().as_bytes())) {
        Ok(())
    } else {
        warn!(algorithm = %algorithm, "Hash claim does not match");
        Err(Error::InvalidHash)
    }
}
