//! Generic claims verifier
//!
//! Checks issuer, subject, audience, authorized party, expiration,
//! not-before, issued-at and nonce, in that order. The first failing check is
//! reported; nothing after it runs.
//!
//! Every credential type (identity tokens, client assertions) funnels through
//! this verifier after its cryptographic step.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::claims::ClaimsSet;
use crate::error::{ClaimViolation, Result};
use crate::id::{AudienceSet, ClientId, Issuer, Nonce};
use crate::time;

/// Claims verifier with immutable expectations
#[derive(Debug, Clone)]
pub struct ClaimsVerifier {
    expected_issuer: Issuer,
    expected_audience: AudienceSet,
    expected_authorized_party: Option<ClientId>,
    clock_skew: Duration,
}

impl ClaimsVerifier {
    /// Create a verifier
    ///
    /// Negative skews are treated as zero.
    pub fn new(expected_issuer: Issuer, expected_audience: AudienceSet, clock_skew: Duration) -> Self {
        Self {
            expected_issuer,
            expected_audience,
            expected_authorized_party: None,
            clock_skew: clock_skew.max(Duration::zero()),
        }
    }

    /// Replace the clock skew tolerance (applies to time claims only)
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.max(Duration::zero());
        self
    }

    /// Require `azp` to equal `client_id` whenever the audience has several entries
    pub fn with_expected_authorized_party(mut self, client_id: ClientId) -> Self {
        self.expected_authorized_party = Some(client_id);
        self
    }

    /// Verify against the current system time
    ///
    /// # Errors
    ///
    /// Returns the first [`ClaimViolation`] encountered.
    pub fn verify(&self, claims: &ClaimsSet, expected_nonce: Option<&Nonce>) -> Result<()> {
        self.verify_at(claims, expected_nonce, Utc::now())
    }

    /// Verify as of `now`
    ///
    /// # Errors
    ///
    /// Returns the first [`ClaimViolation`] encountered.
    pub fn verify_at(
        &self,
        claims: &ClaimsSet,
        expected_nonce: Option<&Nonce>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.check(claims, expected_nonce, now).map_err(|violation| {
            warn!(
                violation = %violation,
                expected_issuer = %self.expected_issuer,
                "Claims verification failed"
            );
            violation.into()
        })
    }

    fn check(
        &self,
        claims: &ClaimsSet,
        expected_nonce: Option<&Nonce>,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ClaimViolation> {
        match &claims.issuer {
            Some(iss) if *iss == self.expected_issuer => {}
            _ => return Err(ClaimViolation::MissingOrWrongIssuer),
        }

        if claims.subject.is_none() {
            return Err(ClaimViolation::MissingSubject);
        }

        if claims.audience.is_empty() {
            return Err(ClaimViolation::MissingAudience);
        }
        if claims.audience.len() > 1
            && let Some(expected_azp) = &self.expected_authorized_party
            && claims.string_claim("azp") != Some(expected_azp.as_str())
        {
            return Err(ClaimViolation::AuthorizedPartyMismatch);
        }
        if !self.expected_audience.intersects(&claims.audience) {
            return Err(ClaimViolation::AudienceMismatch);
        }

        let expiration = claims.expiration.ok_or(ClaimViolation::MissingExpiration)?;
        if time::is_expired(expiration, now, self.clock_skew) {
            return Err(ClaimViolation::Expired);
        }

        if let Some(nbf) = claims.not_before
            && time::is_not_yet_valid(nbf, now, self.clock_skew)
        {
            return Err(ClaimViolation::NotYetValid);
        }

        if let Some(iat) = claims.issued_at
            && time::is_issued_in_future(iat, now, self.clock_skew)
        {
            return Err(ClaimViolation::IssuedInFuture);
        }

        if let Some(expected) = expected_nonce {
            match claims.string_claim("nonce") {
                None => return Err(ClaimViolation::MissingNonce),
                Some(nonce) if nonce != expected.as_str() => {
                    return Err(ClaimViolation::NonceMismatch);
                }
                Some(_) => {}
            }
        }

        debug!(
            issuer = %self.expected_issuer,
            subject = ?claims.subject,
            "Claims verification successful"
        );
        Ok(())
    }

    /// Expected issuer
    pub fn expected_issuer(&self) -> &Issuer {
        &self.expected_issuer
    }

    /// Expected audience set
    pub fn expected_audience(&self) -> &AudienceSet {
        &self.expected_audience
    }

    /// Configured clock skew
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }
}
