//! SAML 2.0 bearer assertion verifier
//!
//! The enveloped signature is checked before any assertion content is
//! interpreted. Condition checks then mirror the JWT claims verifier: issuer
//! equality, audience intersection, required expiration, not-before and issue
//! instant, all with the same clock-skew predicates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use credguard_core::{AudienceSet, ClaimViolation, Error, Issuer, Result, time};

use crate::assertion::{self, Saml2Assertion};
use crate::dsig::{self, SamlVerificationKey};
use crate::grant::Saml2BearerGrant;

/// Verifier for signed SAML 2.0 bearer assertions
#[derive(Debug, Clone)]
pub struct Saml2AssertionVerifier {
    expected_issuer: Issuer,
    expected_audience: AudienceSet,
    keys: Vec<SamlVerificationKey>,
    clock_skew: Duration,
}

impl Saml2AssertionVerifier {
    /// Create a verifier with the default clock skew
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `keys` is empty.
    pub fn new(
        expected_issuer: Issuer,
        expected_audience: AudienceSet,
        keys: Vec<SamlVerificationKey>,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::Configuration(
                "at least one SAML signing key is required".into(),
            ));
        }
        Ok(Self {
            expected_issuer,
            expected_audience,
            keys,
            clock_skew: time::skew_from_secs(credguard_core::DEFAULT_CLOCK_SKEW_SECS),
        })
    }

    /// Set clock skew tolerance
    ///
    /// Negative skews are treated as zero.
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.max(Duration::zero());
        self
    }

    pub fn expected_issuer(&self) -> &Issuer {
        &self.expected_issuer
    }

    pub fn expected_audience(&self) -> &AudienceSet {
        &self.expected_audience
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Verify an assertion document at the current time
    ///
    /// # Errors
    ///
    /// Any failure of [`Self::verify_at`].
    pub fn verify(&self, xml: &str) -> Result<Saml2Assertion> {
        self.verify_at(xml, Utc::now())
    }

    /// Verify the assertion carried by an RFC 7522 grant
    ///
    /// # Errors
    ///
    /// Any failure of [`Self::verify_at`].
    pub fn verify_grant(&self, grant: &Saml2BearerGrant) -> Result<Saml2Assertion> {
        self.verify(grant.assertion())
    }

    /// Verify an assertion document at `now`
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedInput`] if the document cannot be parsed
    /// - signature failures from [`dsig::verify_enveloped`]
    /// - [`Error::MalformedAssertion`] or
    ///   [`ClaimViolation::NoBearerConfirmation`] from [`Saml2Assertion::parse`]
    /// - [`ClaimViolation`] when a condition is not met
    pub fn verify_at(&self, xml: &str, now: DateTime<Utc>) -> Result<Saml2Assertion> {
        let document = assertion::parse_document(xml)?;
        let root = assertion::assertion_root(&document)?;

        dsig::verify_enveloped(&document, root, &self.keys)?;
        let parsed = Saml2Assertion::from_element(root)?;
        self.verify_conditions(&parsed, now)?;

        debug!(
            assertion_id = %parsed.id(),
            issuer = %parsed.issuer(),
            "SAML assertion verified"
        );
        Ok(parsed)
    }

    fn verify_conditions(&self, assertion: &Saml2Assertion, now: DateTime<Utc>) -> Result<()> {
        let reject = |violation: ClaimViolation| {
            warn!(assertion_id = %assertion.id(), %violation, "SAML assertion rejected");
            Err(Error::Claim(violation))
        };

        if assertion.issuer() != &self.expected_issuer {
            return reject(ClaimViolation::MissingOrWrongIssuer);
        }

        if assertion.audiences().is_empty() {
            return reject(ClaimViolation::MissingAudience);
        }
        if !self.expected_audience.intersects(assertion.audiences()) {
            return reject(ClaimViolation::AudienceMismatch);
        }

        let Some(expiration) = assertion.expiration() else {
            return reject(ClaimViolation::MissingExpiration);
        };
        if time::is_expired(expiration, now, self.clock_skew) {
            return reject(ClaimViolation::Expired);
        }

        if let Some(not_before) = assertion.not_before()
            && time::is_not_yet_valid(not_before, now, self.clock_skew)
        {
            return reject(ClaimViolation::NotYetValid);
        }

        if time::is_issued_in_future(assertion.issue_instant(), now, self.clock_skew) {
            return reject(ClaimViolation::IssuedInFuture);
        }

        Ok(())
    }
}

/// Serializable description of a [`Saml2AssertionVerifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saml2VerifierConfig {
    /// Expected assertion `Issuer`
    pub issuer: Issuer,
    /// Accepted audiences (the token endpoint and/or the server's entity ID)
    pub audiences: Vec<String>,
    /// Identity provider signing keys, PEM `CERTIFICATE` or `PUBLIC KEY` blocks
    pub signing_keys: Vec<String>,
    /// Clock skew tolerance in seconds (default: 60)
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,
}

fn default_clock_skew_seconds() -> u64 {
    credguard_core::DEFAULT_CLOCK_SKEW_SECS
}

impl Saml2VerifierConfig {
    /// Build the verifier
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no audience or no signing key is
    /// configured or a key cannot be decoded.
    pub fn build(&self) -> Result<Saml2AssertionVerifier> {
        let keys = self
            .signing_keys
            .iter()
            .map(|pem| SamlVerificationKey::from_pem(pem))
            .collect::<Result<Vec<_>>>()?;
        let audiences = AudienceSet::from_strings(self.audiences.iter().cloned())?;
        Ok(Saml2AssertionVerifier::new(self.issuer.clone(), audiences, keys)?
            .with_clock_skew(time::skew_from_secs(self.clock_skew_seconds)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credguard_core::{Audience, CryptoFailure};

    const EC_PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEbA51EA4x+8PkK/Ssm0USqYd1+uQg
/t9BHJQZwCj7e1xDne/MHQk8zpX7DuFnIBBuy2c4ZtazRWjWNAiYNt3jVg==
-----END PUBLIC KEY-----
";

    fn verifier() -> Saml2AssertionVerifier {
        Saml2AssertionVerifier::new(
            Issuer::new("https://idp.example.com").unwrap(),
            AudienceSet::single(Audience::new("https://c2id.com").unwrap()),
            vec![SamlVerificationKey::from_spki_pem(EC_PUBLIC_KEY).unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let verifier = verifier();
        assert_eq!(verifier.clock_skew(), Duration::seconds(60));
        assert_eq!(verifier.expected_issuer(), "https://idp.example.com");
        assert_eq!(
            verifier
                .with_clock_skew(Duration::zero())
                .clock_skew(),
            Duration::zero()
        );
    }

    #[test]
    fn test_negative_skew_is_clamped() {
        let verifier = verifier().with_clock_skew(Duration::seconds(-60));
        assert_eq!(verifier.clock_skew(), Duration::zero());
    }

    #[test]
    fn test_keys_are_required() {
        let result = Saml2AssertionVerifier::new(
            Issuer::new("https://idp.example.com").unwrap(),
            AudienceSet::single(Audience::new("https://c2id.com").unwrap()),
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unsigned_assertion_is_rejected_before_parsing() {
        // Otherwise malformed (no Subject), yet the signature check runs first
        let xml = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" IssueInstant="2024-06-01T12:00:00Z"/>"#;
        assert_eq!(
            verifier().verify(xml).unwrap_err(),
            Error::Crypto(CryptoFailure::MissingSignature)
        );
    }

    #[test]
    fn test_config_build() {
        let config: Saml2VerifierConfig = serde_json::from_value(serde_json::json!({
            "issuer": "https://idp.example.com",
            "audiences": ["https://c2id.com", "https://c2id.com/token"],
            "signing_keys": [EC_PUBLIC_KEY]
        }))
        .unwrap();
        assert_eq!(config.clock_skew_seconds, 60);
        let verifier = config.build().unwrap();
        assert_eq!(verifier.expected_audience().len(), 2);

        let no_keys = Saml2VerifierConfig {
            signing_keys: Vec::new(),
            ..config.clone()
        };
        assert!(matches!(no_keys.build(), Err(Error::Configuration(_))));

        let no_audience = Saml2VerifierConfig {
            audiences: Vec::new(),
            ..config
        };
        assert!(matches!(no_audience.build(), Err(Error::Configuration(_))));
    }
}
