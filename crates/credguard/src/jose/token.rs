//! Compact token representations
//!
//! A token string is classified exactly once into one of three variants.
//! Downstream code matches on the variant and never inspects the raw string
//! again to decide how to treat it.

use credguard_core::{ClaimsSet, Error, Result};

use super::{EncryptionMethod, JoseHeader, JweAlgorithm, JwsAlgorithm, decode_segment};

/// Parsed JOSE token
#[derive(Debug, Clone)]
pub enum TokenRepresentation {
    /// `alg: none`, empty signature
    Unsecured(UnsecuredJwt),
    /// JWS compact serialization
    Signed(SignedJwt),
    /// JWE compact serialization (nested token inside)
    Encrypted(EncryptedJwt),
}

impl TokenRepresentation {
    /// Classify and parse a compact-serialized token
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedInput`] for a wrong segment count, bad base64/JSON, or
    ///   a non-empty signature on an unsecured token
    /// - [`Error::UnsupportedAlgorithm`] for an unrecognized `alg` or `enc`
    pub fn parse(token: &str) -> Result<Self> {
        let segments: Vec<&str> = token.trim().split('.').collect();
        match segments.as_slice() {
            [header, payload, signature] => {
                let header_json = JoseHeader::decode(header)?;
                let alg: JwsAlgorithm = header_json.alg.parse()?;
                let claims = ClaimsSet::from_json_slice(&decode_segment(payload, "payload")?)?;

                if alg == JwsAlgorithm::None {
                    if !signature.is_empty() {
                        return Err(Error::malformed("unsecured JWT must have an empty signature"));
                    }
                    return Ok(TokenRepresentation::Unsecured(UnsecuredJwt {
                        header: header_json,
                        claims,
                    }));
                }

                if signature.is_empty() {
                    return Err(Error::malformed("signed JWT has an empty signature"));
                }
                decode_segment(signature, "signature")?;

                Ok(TokenRepresentation::Signed(SignedJwt {
                    raw: token.trim().to_string(),
                    header: header_json,
                    algorithm: alg,
                    claims,
                }))
            }
            [header, encrypted_key, iv, ciphertext, tag] => {
                let header_json = JoseHeader::decode(header)?;
                let algorithm: JweAlgorithm = header_json.alg.parse()?;
                let encryption = header_json
                    .enc
                    .as_deref()
                    .ok_or_else(|| Error::malformed("JWE header is missing 'enc'"))?
                    .parse::<EncryptionMethod>()?;

                Ok(TokenRepresentation::Encrypted(EncryptedJwt {
                    protected: (*header).to_string(),
                    header: header_json,
                    algorithm,
                    encryption,
                    encrypted_key: decode_segment(encrypted_key, "encrypted key")?,
                    iv: decode_segment(iv, "initialization vector")?,
                    ciphertext: decode_segment(ciphertext, "ciphertext")?,
                    tag: decode_segment(tag, "authentication tag")?,
                }))
            }
            _ => Err(Error::malformed(format!(
                "expected 3 or 5 dot-separated segments, found {}",
                segments.len()
            ))),
        }
    }

    /// Short name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TokenRepresentation::Unsecured(_) => "unsecured",
            TokenRepresentation::Signed(_) => "signed",
            TokenRepresentation::Encrypted(_) => "encrypted",
        }
    }
}

/// Unsecured JWT (`alg: none`)
#[derive(Debug, Clone)]
pub struct UnsecuredJwt {
    header: JoseHeader,
    claims: ClaimsSet,
}

impl UnsecuredJwt {
    pub fn header(&self) -> &JoseHeader {
        &self.header
    }

    /// Claims (never authenticated)
    pub fn claims(&self) -> &ClaimsSet {
        &self.claims
    }
}

/// Signed JWT, claims not yet verified
#[derive(Debug, Clone)]
pub struct SignedJwt {
    raw: String,
    header: JoseHeader,
    algorithm: JwsAlgorithm,
    claims: ClaimsSet,
}

impl SignedJwt {
    /// Parse a string that must be a JWS
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the token is unsecured, encrypted or
    /// unparseable.
    pub fn parse(token: &str) -> Result<Self> {
        match TokenRepresentation::parse(token)? {
            TokenRepresentation::Signed(jwt) => Ok(jwt),
            other => Err(Error::malformed(format!(
                "expected a signed JWT, found an {} token",
                other.kind()
            ))),
        }
    }

    pub fn header(&self) -> &JoseHeader {
        &self.header
    }

    /// Algorithm declared in the header
    pub fn algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    /// Claims as parsed from the payload; authentic only after verification
    pub fn claims(&self) -> &ClaimsSet {
        &self.claims
    }

    /// Compact serialization
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Encrypted JWT (JWE compact serialization)
#[derive(Debug, Clone)]
pub struct EncryptedJwt {
    pub(crate) protected: String,
    pub(crate) header: JoseHeader,
    pub(crate) algorithm: JweAlgorithm,
    pub(crate) encryption: EncryptionMethod,
    pub(crate) encrypted_key: Vec<u8>,
    pub(crate) iv: Vec<u8>,
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) tag: Vec<u8>,
}

impl EncryptedJwt {
    pub fn header(&self) -> &JoseHeader {
        &self.header
    }

    /// Key management algorithm
    pub fn algorithm(&self) -> JweAlgorithm {
        self.algorithm
    }

    /// Content encryption method
    pub fn encryption_method(&self) -> EncryptionMethod {
        self.encryption
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

    fn b64(data: &str) -> String {
        URL_SAFE_NO_PAD.encode(data)
    }

    const PAYLOAD: &str = r#"{"iss":"https://c2id.com","sub":"alice","aud":"123","exp":2000000000}"#;

    #[test]
    fn test_unsecured_token() {
        let token = format!("{}.{}.", b64(r#"{"alg":"none"}"#), b64(PAYLOAD));
        match TokenRepresentation::parse(&token).unwrap() {
            TokenRepresentation::Unsecured(jwt) => {
                assert_eq!(jwt.claims().subject.as_ref().unwrap(), "alice");
            }
            other => panic!("unexpected variant {}", other.kind()),
        }
    }

    #[test]
    fn test_unsecured_with_signature_rejected() {
        let token = format!("{}.{}.{}", b64(r#"{"alg":"none"}"#), b64(PAYLOAD), b64("sig"));
        assert!(matches!(
            TokenRepresentation::parse(&token),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_signed_token() {
        let token = format!(
            "{}.{}.{}",
            b64(r#"{"alg":"RS256","kid":"k1"}"#),
            b64(PAYLOAD),
            b64("signature-bytes")
        );
        let jwt = SignedJwt::parse(&token).unwrap();
        assert_eq!(jwt.algorithm(), JwsAlgorithm::RS256);
        assert_eq!(jwt.header().kid.as_deref(), Some("k1"));
        assert_eq!(jwt.as_str(), token);
    }

    #[test]
    fn test_unknown_algorithm() {
        let token = format!("{}.{}.{}", b64(r#"{"alg":"XS1"}"#), b64(PAYLOAD), b64("s"));
        assert!(matches!(
            TokenRepresentation::parse(&token),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_encrypted_token() {
        let token = format!(
            "{}.{}.{}.{}.{}",
            b64(r#"{"alg":"RSA-OAEP-256","enc":"A128GCM","cty":"JWT"}"#),
            b64("key"),
            b64("iv"),
            b64("ct"),
            b64("tag")
        );
        match TokenRepresentation::parse(&token).unwrap() {
            TokenRepresentation::Encrypted(jwe) => {
                assert_eq!(jwe.algorithm(), JweAlgorithm::RsaOaep256);
                assert_eq!(jwe.encryption_method(), EncryptionMethod::A128Gcm);
            }
            other => panic!("unexpected variant {}", other.kind()),
        }
    }

    #[test]
    fn test_encrypted_token_requires_enc() {
        let token = format!("{}.a.b.c.d", b64(r#"{"alg":"dir"}"#));
        assert!(matches!(
            TokenRepresentation::parse(&token),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_segment_count() {
        for token in ["", "abc", "a.b", "a.b.c.d", "a.b.c.d.e.f"] {
            assert!(
                matches!(TokenRepresentation::parse(token), Err(Error::MalformedInput(_))),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_signed_jwt_parse_rejects_unsecured() {
        let token = format!("{}.{}.", b64(r#"{"alg":"none"}"#), b64(PAYLOAD));
        assert!(matches!(SignedJwt::parse(&token), Err(Error::MalformedInput(_))));
    }
}
