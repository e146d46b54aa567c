//! JWT bearer client assertions (RFC 7523)

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use credguard_core::{Audience, ClaimsSet, ClientId, Error, JwtId, Result};

use crate::jose::{AlgorithmFamily, SignedJwt};

/// Default lifetime of an issued client assertion
pub const DEFAULT_ASSERTION_LIFETIME_SECS: i64 = 300;

fn client_id_of(assertion: &SignedJwt) -> Result<ClientId> {
    let subject = assertion
        .claims()
        .subject
        .as_ref()
        .ok_or_else(|| Error::malformed("client assertion has no subject"))?;
    ClientId::new(subject.as_str())
}

/// `client_secret_jwt` assertion: HMAC with the client secret
#[derive(Debug, Clone)]
pub struct ClientSecretJwt {
    assertion: SignedJwt,
    client_id: ClientId,
}

impl ClientSecretJwt {
    /// Wrap a parsed assertion
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedAlgorithm`] unless the assertion uses an HMAC algorithm
    /// - [`Error::MalformedInput`] if the assertion has no subject
    pub fn new(assertion: SignedJwt) -> Result<Self> {
        if assertion.algorithm().family() != AlgorithmFamily::Hmac {
            return Err(Error::UnsupportedAlgorithm(assertion.algorithm().to_string()));
        }
        let client_id = client_id_of(&assertion)?;
        Ok(Self {
            assertion,
            client_id,
        })
    }

    pub fn assertion(&self) -> &SignedJwt {
        &self.assertion
    }

    /// Client identifier claimed by the assertion subject
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

/// `private_key_jwt` assertion: RSA or EC signature
#[derive(Debug, Clone)]
pub struct PrivateKeyJwt {
    assertion: SignedJwt,
    client_id: ClientId,
}

impl PrivateKeyJwt {
    /// Wrap a parsed assertion
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedAlgorithm`] unless the assertion uses an RSA or EC algorithm
    /// - [`Error::MalformedInput`] if the assertion has no subject
    pub fn new(assertion: SignedJwt) -> Result<Self> {
        if !matches!(
            assertion.algorithm().family(),
            AlgorithmFamily::Rsa | AlgorithmFamily::Ec
        ) {
            return Err(Error::UnsupportedAlgorithm(assertion.algorithm().to_string()));
        }
        let client_id = client_id_of(&assertion)?;
        Ok(Self {
            assertion,
            client_id,
        })
    }

    pub fn assertion(&self) -> &SignedJwt {
        &self.assertion
    }

    /// Client identifier claimed by the assertion subject
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

/// Claims for issuing a client assertion
///
/// Issuer and subject are the client id, expiration defaults to five minutes
/// from now and `jti` is a random UUID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientAssertionClaims {
    pub iss: ClientId,
    pub sub: ClientId,
    pub aud: Vec<Audience>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub nbf: Option<DateTime<Utc>>,
    pub jti: String,
}

impl ClientAssertionClaims {
    pub fn new(client_id: ClientId, audience: Audience) -> Self {
        let now = Utc::now();
        Self {
            iss: client_id.clone(),
            sub: client_id,
            aud: vec![audience],
            exp: now + Duration::seconds(DEFAULT_ASSERTION_LIFETIME_SECS),
            iat: now,
            nbf: None,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Override the lifetime, counted from `iat`
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.exp = self.iat + lifetime;
        self
    }

    /// Set `nbf`
    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.nbf = Some(not_before);
        self
    }

    /// Convert into a generic claims set
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if serialization fails.
    pub fn to_claims_set(&self) -> Result<ClaimsSet> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => ClaimsSet::from_map(map),
            _ => Err(Error::malformed("client assertion claims are not an object")),
        }
    }
}

/// A verified client assertion
///
/// `jti` and `expiration` are exposed for an external replay cache; the
/// verifier itself does not track used assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClientAssertion {
    client_id: ClientId,
    jwt_id: Option<JwtId>,
    expiration: DateTime<Utc>,
    issued_at: Option<DateTime<Utc>>,
    claims: ClaimsSet,
}

impl VerifiedClientAssertion {
    pub(crate) fn from_verified(client_id: ClientId, claims: ClaimsSet) -> Result<Self> {
        let expiration = claims
            .expiration
            .ok_or(credguard_core::ClaimViolation::MissingExpiration)?;
        Ok(Self {
            client_id,
            jwt_id: claims.jwt_id.clone(),
            expiration,
            issued_at: claims.issued_at,
            claims,
        })
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn jwt_id(&self) -> Option<&JwtId> {
        self.jwt_id.as_ref()
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn claims(&self) -> &ClaimsSet {
        &self.claims
    }
}
