//! JOSE primitives: algorithms, headers and compact token representations
//!
//! - `token` - three-way [`TokenRepresentation`] resolved once at parse time
//! - `jws` - signature verification (delegated to `jsonwebtoken`)
//! - `jwe` - RFC 7516 compact decryption

pub mod jwe;
pub mod jws;
pub mod token;

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use credguard_core::{Error, Result};

pub use jwe::JweDecryptionKey;
pub use jws::JwsVerificationKey;
pub use token::{EncryptedJwt, SignedJwt, TokenRepresentation, UnsecuredJwt};

/// Algorithm family, used to classify client assertions and to filter keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    /// HMAC with SHA-2
    Hmac,
    /// RSASSA-PKCS1-v1_5 and RSASSA-PSS
    Rsa,
    /// ECDSA
    Ec,
    /// Edwards-curve signatures
    Ed,
    /// Unsecured
    None,
}

/// JWS algorithm (RFC 7518 §3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JwsAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    ES512,
    EdDSA,
    /// `none` (unsecured JWT)
    None,
}

impl JwsAlgorithm {
    /// Every algorithm this crate recognizes
    pub const ALL: [JwsAlgorithm; 14] = [
        JwsAlgorithm::HS256,
        JwsAlgorithm::HS384,
        JwsAlgorithm::HS512,
        JwsAlgorithm::RS256,
        JwsAlgorithm::RS384,
        JwsAlgorithm::RS512,
        JwsAlgorithm::PS256,
        JwsAlgorithm::PS384,
        JwsAlgorithm::PS512,
        JwsAlgorithm::ES256,
        JwsAlgorithm::ES384,
        JwsAlgorithm::ES512,
        JwsAlgorithm::EdDSA,
        JwsAlgorithm::None,
    ];

    /// Registered `alg` name
    pub fn as_str(self) -> &'static str {
        match self {
            JwsAlgorithm::HS256 => "HS256",
            JwsAlgorithm::HS384 => "HS384",
            JwsAlgorithm::HS512 => "HS512",
            JwsAlgorithm::RS256 => "RS256",
            JwsAlgorithm::RS384 => "RS384",
            JwsAlgorithm::RS512 => "RS512",
            JwsAlgorithm::PS256 => "PS256",
            JwsAlgorithm::PS384 => "PS384",
            JwsAlgorithm::PS512 => "PS512",
            JwsAlgorithm::ES256 => "ES256",
            JwsAlgorithm::ES384 => "ES384",
            JwsAlgorithm::ES512 => "ES512",
            JwsAlgorithm::EdDSA => "EdDSA",
            JwsAlgorithm::None => "none",
        }
    }

    /// Family this algorithm belongs to
    pub fn family(self) -> AlgorithmFamily {
        match self {
            JwsAlgorithm::HS256 | JwsAlgorithm::HS384 | JwsAlgorithm::HS512 => {
                AlgorithmFamily::Hmac
            }
            JwsAlgorithm::RS256
            | JwsAlgorithm::RS384
            | JwsAlgorithm::RS512
            | JwsAlgorithm::PS256
            | JwsAlgorithm::PS384
            | JwsAlgorithm::PS512 => AlgorithmFamily::Rsa,
            JwsAlgorithm::ES256 | JwsAlgorithm::ES384 | JwsAlgorithm::ES512 => AlgorithmFamily::Ec,
            JwsAlgorithm::EdDSA => AlgorithmFamily::Ed,
            JwsAlgorithm::None => AlgorithmFamily::None,
        }
    }

    /// Equivalent `jsonwebtoken` algorithm
    ///
    /// `none` and ES512 have no `jsonwebtoken` counterpart and cannot be verified.
    pub fn to_jsonwebtoken(self) -> Option<jsonwebtoken::Algorithm> {
        use jsonwebtoken::Algorithm;
        Some(match self {
            JwsAlgorithm::HS256 => Algorithm::HS256,
            JwsAlgorithm::HS384 => Algorithm::HS384,
            JwsAlgorithm::HS512 => Algorithm::HS512,
            JwsAlgorithm::RS256 => Algorithm::RS256,
            JwsAlgorithm::RS384 => Algorithm::RS384,
            JwsAlgorithm::RS512 => Algorithm::RS512,
            JwsAlgorithm::PS256 => Algorithm::PS256,
            JwsAlgorithm::PS384 => Algorithm::PS384,
            JwsAlgorithm::PS512 => Algorithm::PS512,
            JwsAlgorithm::ES256 => Algorithm::ES256,
            JwsAlgorithm::ES384 => Algorithm::ES384,
            JwsAlgorithm::EdDSA => Algorithm::EdDSA,
            JwsAlgorithm::ES512 | JwsAlgorithm::None => return None,
        })
    }
}

impl FromStr for JwsAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JwsAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| Error::UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JwsAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JwsAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// JWE key management algorithm (RFC 7518 §4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JweAlgorithm {
    /// RSAES OAEP using default parameters (SHA-1)
    RsaOaep,
    /// RSAES OAEP using SHA-256
    RsaOaep256,
    /// Direct use of a shared symmetric key as the CEK
    Dir,
}

impl JweAlgorithm {
    /// Registered `alg` name
    pub fn as_str(self) -> &'static str {
        match self {
            JweAlgorithm::RsaOaep => "RSA-OAEP",
            JweAlgorithm::RsaOaep256 => "RSA-OAEP-256",
            JweAlgorithm::Dir => "dir",
        }
    }
}

impl FromStr for JweAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RSA-OAEP" => Ok(JweAlgorithm::RsaOaep),
            "RSA-OAEP-256" => Ok(JweAlgorithm::RsaOaep256),
            "dir" => Ok(JweAlgorithm::Dir),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for JweAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWE content encryption method (RFC 7518 §5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionMethod {
    A128Gcm,
    A256Gcm,
    A128CbcHs256,
    A256CbcHs512,
}

impl EncryptionMethod {
    /// Registered `enc` name
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionMethod::A128Gcm => "A128GCM",
            EncryptionMethod::A256Gcm => "A256GCM",
            EncryptionMethod::A128CbcHs256 => "A128CBC-HS256",
            EncryptionMethod::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    /// Required content encryption key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            EncryptionMethod::A128Gcm => 16,
            EncryptionMethod::A256Gcm => 32,
            EncryptionMethod::A128CbcHs256 => 32,
            EncryptionMethod::A256CbcHs512 => 64,
        }
    }
}

impl FromStr for EncryptionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A128GCM" => Ok(EncryptionMethod::A128Gcm),
            "A256GCM" => Ok(EncryptionMethod::A256Gcm),
            "A128CBC-HS256" => Ok(EncryptionMethod::A128CbcHs256),
            "A256CBC-HS512" => Ok(EncryptionMethod::A256CbcHs512),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protected JOSE header
///
/// Unknown parameters are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoseHeader {
    /// `alg`, kept raw so unknown algorithms can be reported by name
    pub alg: String,
    /// `kid`
    #[serde(default)]
    pub kid: Option<String>,
    /// `typ`
    #[serde(default)]
    pub typ: Option<String>,
    /// `cty`
    #[serde(default)]
    pub cty: Option<String>,
    /// `enc` (JWE only)
    #[serde(default)]
    pub enc: Option<String>,
}

impl JoseHeader {
    /// Decode a base64url protected header segment
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] on bad base64 or non-object JSON.
    pub fn decode(segment: &str) -> Result<Self> {
        let bytes = decode_segment(segment, "header")?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::malformed(format!("invalid JOSE header: {e}")))
    }

    /// Header carrying only an algorithm (used for locally built selectors)
    pub fn for_algorithm(alg: JwsAlgorithm) -> Self {
        Self {
            alg: alg.as_str().to_string(),
            kid: None,
            typ: None,
            cty: None,
            enc: None,
        }
    }
}

/// Decode one base64url (unpadded) segment
pub(crate) fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| Error::malformed(format!("invalid base64url in {what}: {e}")))
}
