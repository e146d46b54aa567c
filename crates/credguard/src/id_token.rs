//! OpenID Connect ID token validation
//!
//! Handles the three wire representations:
//!
//! - **Unsecured** (`alg: none`): accepted only by a validator built without a
//!   JWS key selector
//! - **Signed**: header algorithm must equal the selector's algorithm, the
//!   signature must verify with one of the selected keys
//! - **Signed-then-encrypted**: `alg`/`enc` must equal the JWE selector's pair;
//!   the decrypted payload must itself be a signed JWT, which is then
//!   validated as above
//!
//! Every path ends in the claims verifier: issuer, subject, audience (the
//! client id plus configured extras), `azp` for multi-audience tokens,
//! expiration, not-before, issued-at and nonce.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use credguard_core::{
    Audience, AudienceSet, ClaimViolation, ClaimsSet, ClaimsVerifier, ClientId, CryptoFailure,
    Error, Issuer, JwtId, Nonce, Result, Secret, Subject, time,
};

use crate::config::IdTokenValidatorConfig;
use crate::hash::{self, HashClaim};
use crate::jose::{AlgorithmFamily, JwsAlgorithm, SignedJwt, TokenRepresentation, jwe, jws};
use crate::keys::{
    JweKeySelector, JwsKeySelector, JwsVerificationKeySelector, RemoteJwkSet, SecretKeySelector,
};

/// Claims of a validated ID token
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    issuer: Issuer,
    subject: Subject,
    audience: Vec<Audience>,
    expiration: DateTime<Utc>,
    auth_time: Option<DateTime<Utc>>,
    claims: ClaimsSet,
}

impl VerifiedClaims {
    fn from_verified(claims: ClaimsSet) -> Result<Self> {
        let issuer = claims
            .issuer
            .clone()
            .ok_or(ClaimViolation::MissingOrWrongIssuer)?;
        let subject = claims.subject.clone().ok_or(ClaimViolation::MissingSubject)?;
        let expiration = claims.expiration.ok_or(ClaimViolation::MissingExpiration)?;
        let auth_time = claims.date_claim("auth_time")?;
        Ok(Self {
            issuer,
            subject,
            audience: claims.audience.clone(),
            expiration,
            auth_time,
            claims,
        })
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn audience(&self) -> &[Audience] {
        &self.audience
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.claims.issued_at
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.claims.not_before
    }

    pub fn jwt_id(&self) -> Option<&JwtId> {
        self.claims.jwt_id.as_ref()
    }

    pub fn nonce(&self) -> Option<&str> {
        self.claims.string_claim("nonce")
    }

    /// `azp`
    pub fn authorized_party(&self) -> Option<&str> {
        self.claims.string_claim("azp")
    }

    /// `acr`
    pub fn acr(&self) -> Option<&str> {
        self.claims.string_claim("acr")
    }

    /// `amr`
    pub fn amr(&self) -> Option<Vec<&str>> {
        self.claims.string_list_claim("amr")
    }

    /// `auth_time`
    pub fn auth_time(&self) -> Option<DateTime<Utc>> {
        self.auth_time
    }

    /// `at_hash`
    pub fn access_token_hash(&self) -> Option<HashClaim> {
        self.claims.string_claim("at_hash").map(HashClaim::new)
    }

    /// `c_hash`
    pub fn code_hash(&self) -> Option<HashClaim> {
        self.claims.string_claim("c_hash").map(HashClaim::new)
    }

    /// Any non-registered claim
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.claim(name)
    }

    /// The full claims set
    pub fn claims_set(&self) -> &ClaimsSet {
        &self.claims
    }
}

/// Result of a successful ID token validation
#[derive(Debug, Clone)]
pub struct VerifiedIdToken {
    claims: VerifiedClaims,
    algorithm: JwsAlgorithm,
    key_id: Option<String>,
}

impl VerifiedIdToken {
    pub fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }

    /// JWS algorithm of the (inner) token; `none` for unsecured tokens
    pub fn algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    /// Identifier of the key that verified the signature, if known
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Check the `at_hash` claim against an access token
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] if the claim is missing or does not match.
    pub fn verify_access_token(&self, access_token: &str) -> Result<()> {
        let claimed = self.claims.access_token_hash().ok_or(Error::InvalidHash)?;
        hash::validate(access_token.as_bytes(), self.algorithm, &claimed)
    }

    /// Check the `c_hash` claim against an authorization code
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] if the claim is missing or does not match.
    pub fn verify_authorization_code(&self, code: &str) -> Result<()> {
        let claimed = self.claims.code_hash().ok_or(Error::InvalidHash)?;
        hash::validate(code.as_bytes(), self.algorithm, &claimed)
    }
}

/// ID token validator
///
/// Immutable after construction and safe to share between tasks.
///
/// # Example
///
/// ```rust,no_run
/// # use credguard::id_token::IdTokenValidator;
/// # use credguard::jose::JwsAlgorithm;
/// # use credguard::keys::{JwsVerificationKeySelector, RemoteJwkSet};
/// # use credguard_core::{ClientId, Issuer};
/// # tokio_test::block_on(async {
/// let jwks = RemoteJwkSet::new("https://c2id.com/jwks.json".parse()?)?;
/// let validator = IdTokenValidator::signed(
///     Issuer::new("https://c2id.com")?,
///     ClientId::new("123")?,
///     JwsVerificationKeySelector::new(JwsAlgorithm::RS256, jwks)?,
/// );
///
/// let verified = validator.validate("eyJhbGciOiJSUzI1NiJ9...", None).await?;
/// println!("Signed in: {}", verified.claims().subject());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone)]
pub struct IdTokenValidator {
    issuer: Issuer,
    client_id: ClientId,
    audiences: AudienceSet,
    clock_skew: Duration,
    claims_verifier: ClaimsVerifier,
    jws_selector: Option<Arc<dyn JwsKeySelector>>,
    jwe_selector: Option<Arc<dyn JweKeySelector>>,
    max_auth_age: Option<Duration>,
}

impl std::fmt::Debug for IdTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenValidator")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("audiences", &self.audiences)
            .field("clock_skew", &self.clock_skew)
            .field(
                "jws_algorithm",
                &self.jws_selector.as_ref().map(|s| s.expected_algorithm()),
            )
            .field(
                "jwe",
                &self
                    .jwe_selector
                    .as_ref()
                    .map(|s| (s.expected_algorithm(), s.expected_encryption_method())),
            )
            .field("max_auth_age", &self.max_auth_age)
            .finish()
    }
}

impl IdTokenValidator {
    fn build(
        issuer: Issuer,
        client_id: ClientId,
        jws_selector: Option<Arc<dyn JwsKeySelector>>,
    ) -> Self {
        let audiences = AudienceSet::single(client_id.clone().into());
        let clock_skew = time::skew_from_secs(credguard_core::DEFAULT_CLOCK_SKEW_SECS);
        let claims_verifier = ClaimsVerifier::new(issuer.clone(), audiences.clone(), clock_skew)
            .with_expected_authorized_party(client_id.clone());
        Self {
            issuer,
            client_id,
            audiences,
            clock_skew,
            claims_verifier,
            jws_selector,
            jwe_selector: None,
            max_auth_age: None,
        }
    }

    fn rebuild_claims_verifier(mut self) -> Self {
        self.claims_verifier =
            ClaimsVerifier::new(self.issuer.clone(), self.audiences.clone(), self.clock_skew)
                .with_expected_authorized_party(self.client_id.clone());
        self
    }

    /// Validator for unsecured (`alg: none`) ID tokens only
    pub fn unsecured(issuer: Issuer, client_id: ClientId) -> Self {
        Self::build(issuer, client_id, None)
    }

    /// Validator for signed ID tokens
    pub fn signed<S: JwsKeySelector + 'static>(
        issuer: Issuer,
        client_id: ClientId,
        selector: S,
    ) -> Self {
        Self::build(issuer, client_id, Some(Arc::new(selector)))
    }

    /// Also accept signed-then-encrypted ID tokens
    pub fn with_jwe_selector<S: JweKeySelector + 'static>(mut self, selector: S) -> Self {
        self.jwe_selector = Some(Arc::new(selector));
        self
    }

    /// Set clock skew tolerance (default: 60 seconds)
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.max(Duration::zero());
        self.rebuild_claims_verifier()
    }

    /// Accept audiences besides the client id
    pub fn with_additional_audiences(mut self, audiences: impl IntoIterator<Item = Audience>) -> Self {
        for audience in audiences {
            self.audiences.insert(audience);
        }
        self.rebuild_claims_verifier()
    }

    /// Require `auth_time` no older than `max_age`
    pub fn with_max_auth_age(mut self, max_age: Duration) -> Self {
        self.max_auth_age = Some(max_age);
        self
    }

    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the key source required by the
    /// configured algorithm is missing or unusable.
    pub fn from_config(config: &IdTokenValidatorConfig) -> Result<Self> {
        let issuer = config.issuer.clone();
        let client_id = config.client_id.clone();

        let validator = match config.algorithm.family() {
            AlgorithmFamily::None => Self::unsecured(issuer, client_id),
            AlgorithmFamily::Hmac => {
                let secret = config.client_secret.clone().ok_or_else(|| {
                    Error::Configuration(format!(
                        "{} ID tokens require a client_secret",
                        config.algorithm
                    ))
                })?;
                let selector = SecretKeySelector::new(config.algorithm, vec![Secret::from(secret)])?;
                Self::signed(issuer, client_id, selector)
            }
            _ => {
                let jwks_uri = config.jwks_uri.clone().ok_or_else(|| {
                    Error::Configuration(format!("{} ID tokens require a jwks_uri", config.algorithm))
                })?;
                let source = RemoteJwkSet::from_config(jwks_uri, &config.jwks)?;
                let selector = JwsVerificationKeySelector::new(config.algorithm, source)?;
                Self::signed(issuer, client_id, selector)
            }
        };

        let additional = config
            .additional_audiences
            .iter()
            .map(Audience::new)
            .collect::<Result<Vec<_>>>()?;
        let validator = validator
            .with_clock_skew(time::skew_from_secs(config.clock_skew_seconds))
            .with_additional_audiences(additional);

        Ok(match config.max_auth_age_seconds {
            Some(secs) => validator.with_max_auth_age(time::skew_from_secs(secs)),
            None => validator,
        })
    }

    /// Expected issuer
    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// Client id this validator serves
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Accepted audiences
    pub fn audiences(&self) -> &AudienceSet {
        &self.audiences
    }

    /// Configured clock skew
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Validate an ID token against the current time
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedInput`] if the token cannot be parsed, or an
    ///   encrypted token does not wrap a signed JWT
    /// - [`Error::UnsupportedAlgorithm`] if the token's representation or
    ///   algorithm is not the one this validator was built for
    /// - [`Error::Crypto`] if no key matches, verifies, or decrypts
    /// - [`Error::Claim`] if the claims are not acceptable
    pub async fn validate(
        &self,
        token: &str,
        expected_nonce: Option<&Nonce>,
    ) -> Result<VerifiedIdToken> {
        self.validate_at(token, expected_nonce, Utc::now()).await
    }

    /// Validate an ID token as of `now`
    ///
    /// # Errors
    ///
    /// Same as [`IdTokenValidator::validate`].
    pub async fn validate_at(
        &self,
        token: &str,
        expected_nonce: Option<&Nonce>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdToken> {
        match TokenRepresentation::parse(token)? {
            TokenRepresentation::Unsecured(jwt) => {
                if self.jws_selector.is_some() {
                    warn!(issuer = %self.issuer, "Rejected unsecured ID token");
                    return Err(Error::UnsupportedAlgorithm(JwsAlgorithm::None.to_string()));
                }
                self.verify_claims(jwt.claims().clone(), JwsAlgorithm::None, None, expected_nonce, now)
            }
            TokenRepresentation::Signed(jwt) => {
                self.validate_signed(&jwt, expected_nonce, now).await
            }
            TokenRepresentation::Encrypted(jwe_token) => {
                let Some(selector) = self.jwe_selector.as_ref() else {
                    warn!(issuer = %self.issuer, "Rejected encrypted ID token, no decryption configured");
                    return Err(Error::UnsupportedAlgorithm(jwe_token.algorithm().to_string()));
                };
                if jwe_token.algorithm() != selector.expected_algorithm() {
                    return Err(Error::UnsupportedAlgorithm(jwe_token.algorithm().to_string()));
                }
                if jwe_token.encryption_method() != selector.expected_encryption_method() {
                    return Err(Error::UnsupportedAlgorithm(
                        jwe_token.encryption_method().to_string(),
                    ));
                }

                let candidates = selector.select_keys(jwe_token.header()).await?;
                if candidates.is_empty() {
                    warn!(issuer = %self.issuer, key_id = ?jwe_token.header().kid, "No decryption key");
                    return Err(CryptoFailure::NoMatchingKey.into());
                }
                let plaintext = candidates
                    .iter()
                    .find_map(|key| jwe::decrypt(&jwe_token, key).ok())
                    .ok_or_else(|| {
                        warn!(issuer = %self.issuer, candidates = candidates.len(), "ID token decryption failed");
                        Error::Crypto(CryptoFailure::DecryptionFailed)
                    })?;

                let nested = std::str::from_utf8(&plaintext)
                    .map_err(|_| Error::malformed("decrypted ID token is not UTF-8"))?;
                match TokenRepresentation::parse(nested)? {
                    TokenRepresentation::Signed(jwt) => {
                        self.validate_signed(&jwt, expected_nonce, now).await
                    }
                    other => Err(Error::malformed(format!(
                        "encrypted ID token must wrap a signed JWT, found an {} token",
                        other.kind()
                    ))),
                }
            }
        }
    }

    async fn validate_signed(
        &self,
        jwt: &SignedJwt,
        expected_nonce: Option<&Nonce>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdToken> {
        let algorithm = jwt.algorithm();
        let Some(selector) = self.jws_selector.as_ref() else {
            warn!(issuer = %self.issuer, algorithm = %algorithm, "Rejected signed ID token, validator expects unsecured tokens");
            return Err(Error::UnsupportedAlgorithm(algorithm.to_string()));
        };
        if algorithm != selector.expected_algorithm() {
            warn!(
                algorithm = %algorithm,
                expected = %selector.expected_algorithm(),
                "ID token algorithm not accepted"
            );
            return Err(Error::UnsupportedAlgorithm(algorithm.to_string()));
        }

        let candidates = selector.select_keys(jwt.header(), now).await?;
        if candidates.is_empty() {
            warn!(issuer = %self.issuer, key_id = ?jwt.header().kid, "No matching key for ID token");
            return Err(CryptoFailure::NoMatchingKey.into());
        }
        let Some(key) = jws::verify_with_any(jwt, &candidates)? else {
            warn!(issuer = %self.issuer, candidates = candidates.len(), "ID token signature invalid");
            return Err(CryptoFailure::InvalidSignature.into());
        };
        let key_id = key
            .key_id()
            .map(str::to_string)
            .or_else(|| jwt.header().kid.clone());

        self.verify_claims(jwt.claims().clone(), algorithm, key_id, expected_nonce, now)
    }

    fn verify_claims(
        &self,
        claims: ClaimsSet,
        algorithm: JwsAlgorithm,
        key_id: Option<String>,
        expected_nonce: Option<&Nonce>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdToken> {
        self.claims_verifier.verify_at(&claims, expected_nonce, now)?;
        let claims = VerifiedClaims::from_verified(claims)?;

        if let Some(max_age) = self.max_auth_age {
            let auth_time = claims.auth_time().ok_or(ClaimViolation::MissingAuthTime)?;
            let too_old = auth_time
                .checked_add_signed(max_age)
                .and_then(|t| t.checked_add_signed(self.clock_skew))
                .is_some_and(|limit| now > limit);
            if too_old {
                warn!(subject = %claims.subject(), "ID token authentication too old");
                return Err(ClaimViolation::AuthTimeTooOld.into());
            }
        }

        debug!(
            issuer = %claims.issuer(),
            subject = %claims.subject(),
            algorithm = %algorithm,
            "ID token validation successful"
        );
        Ok(VerifiedIdToken {
            claims,
            algorithm,
            key_id,
        })
    }
}
