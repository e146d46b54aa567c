//! Client authentication verification

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::JwkSet;
use tracing::{debug, warn};

use credguard_core::{
    AudienceSet, ClaimViolation, ClaimsVerifier, ClientId, CryptoFailure, Error, Issuer, Result,
    Secret, time,
};

use super::assertion::VerifiedClientAssertion;
use super::{ClientAuthMethod, ClientAuthentication};
use crate::config::{ClientAuthConfig, RegisteredClient};
use crate::jose::{JoseHeader, JwsAlgorithm, JwsVerificationKey, SignedJwt, jws};
use crate::keys::select_from_jwks;

/// Lookup of a client's registered credentials
#[async_trait]
pub trait ClientCredentialsSelector: Send + Sync {
    /// Shared secrets registered for `client_id`
    async fn select_client_secrets(
        &self,
        client_id: &ClientId,
        method: ClientAuthMethod,
    ) -> Result<Vec<Secret>>;

    /// Public keys registered for `client_id` usable with the assertion header
    async fn select_public_keys(
        &self,
        client_id: &ClientId,
        header: &JoseHeader,
    ) -> Result<Vec<JwsVerificationKey>>;

    /// Registered authentication method, `None` if unknown
    async fn registered_method(&self, _client_id: &ClientId) -> Result<Option<ClientAuthMethod>> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
struct ClientEntry {
    method: ClientAuthMethod,
    secrets: Vec<Secret>,
    jwks: Option<JwkSet>,
}

/// In-memory client registry
#[derive(Debug, Clone, Default)]
pub struct StaticClientRegistry {
    clients: HashMap<ClientId, ClientEntry>,
}

impl StaticClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client using a shared secret
    pub fn with_secret_client(
        mut self,
        client_id: ClientId,
        method: ClientAuthMethod,
        secrets: Vec<Secret>,
    ) -> Self {
        self.clients.insert(
            client_id,
            ClientEntry {
                method,
                secrets,
                jwks: None,
            },
        );
        self
    }

    /// Register a `private_key_jwt` client
    pub fn with_key_client(mut self, client_id: ClientId, jwks: JwkSet) -> Self {
        self.clients.insert(
            client_id,
            ClientEntry {
                method: ClientAuthMethod::PrivateKeyJwt,
                secrets: Vec::new(),
                jwks: Some(jwks),
            },
        );
        self
    }

    /// Register a public client
    pub fn with_public_client(mut self, client_id: ClientId) -> Self {
        self.clients.insert(
            client_id,
            ClientEntry {
                method: ClientAuthMethod::None,
                secrets: Vec::new(),
                jwks: None,
            },
        );
        self
    }

    /// Build from registered client configuration
    pub fn from_config(clients: &[RegisteredClient]) -> Self {
        let clients = clients
            .iter()
            .map(|client| {
                (
                    client.client_id.clone(),
                    ClientEntry {
                        method: client.method,
                        secrets: client.secrets.iter().cloned().map(Secret::from).collect(),
                        jwks: client.jwks.clone(),
                    },
                )
            })
            .collect();
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientCredentialsSelector for StaticClientRegistry {
    async fn select_client_secrets(
        &self,
        client_id: &ClientId,
        method: ClientAuthMethod,
    ) -> Result<Vec<Secret>> {
        Ok(self
            .clients
            .get(client_id)
            .filter(|_| method.uses_shared_secret())
            .map(|entry| entry.secrets.clone())
            .unwrap_or_default())
    }

    async fn select_public_keys(
        &self,
        client_id: &ClientId,
        header: &JoseHeader,
    ) -> Result<Vec<JwsVerificationKey>> {
        let Some(jwks) = self.clients.get(client_id).and_then(|entry| entry.jwks.as_ref()) else {
            return Ok(Vec::new());
        };
        let algorithm = JwsAlgorithm::from_str(&header.alg)?;
        Ok(select_from_jwks(jwks, algorithm, header))
    }

    async fn registered_method(&self, client_id: &ClientId) -> Result<Option<ClientAuthMethod>> {
        Ok(self.clients.get(client_id).map(|entry| entry.method))
    }
}

/// An authenticated client
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClient {
    client_id: ClientId,
    method: ClientAuthMethod,
    assertion: Option<VerifiedClientAssertion>,
}

impl VerifiedClient {
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn method(&self) -> ClientAuthMethod {
        self.method
    }

    /// The verified assertion for `client_secret_jwt` / `private_key_jwt`
    pub fn assertion(&self) -> Option<&VerifiedClientAssertion> {
        self.assertion.as_ref()
    }
}

/// Token endpoint client authentication verifier
///
/// Assertions must name the client as both issuer and subject and be
/// addressed to one of the expected audiences (typically the token endpoint
/// URL and the authorization server issuer).
#[derive(Clone)]
pub struct ClientAuthVerifier {
    selector: Arc<dyn ClientCredentialsSelector>,
    expected_audience: AudienceSet,
    clock_skew: Duration,
}

impl std::fmt::Debug for ClientAuthVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAuthVerifier")
            .field("expected_audience", &self.expected_audience)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl ClientAuthVerifier {
    pub fn new<S: ClientCredentialsSelector + 'static>(
        selector: S,
        expected_audience: AudienceSet,
    ) -> Self {
        Self {
            selector: Arc::new(selector),
            expected_audience,
            clock_skew: time::skew_from_secs(credguard_core::DEFAULT_CLOCK_SKEW_SECS),
        }
    }

    /// Set clock skew tolerance (default: 60 seconds)
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.max(Duration::zero());
        self
    }

    /// Build a verifier over a [`StaticClientRegistry`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no usable audience is configured.
    pub fn from_config(config: &ClientAuthConfig) -> Result<Self> {
        let expected_audience = AudienceSet::from_strings(&config.expected_audience)
            .map_err(|e| Error::Configuration(format!("invalid expected_audience: {e}")))?;
        Ok(Self::new(
            StaticClientRegistry::from_config(&config.clients),
            expected_audience,
        )
        .with_clock_skew(time::skew_from_secs(config.clock_skew_seconds)))
    }

    pub fn expected_audience(&self) -> &AudienceSet {
        &self.expected_audience
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Verify a presented client credential against the current time
    ///
    /// # Errors
    ///
    /// - [`ClaimViolation::AuthMethodMismatch`] if the client registered a
    ///   different method
    /// - [`CryptoFailure::NoMatchingKey`] if the client has no usable
    ///   credential for the method
    /// - [`CryptoFailure::InvalidSecret`] / [`CryptoFailure::InvalidSignature`]
    ///   if the credential does not verify
    /// - [`ClaimViolation`] for unacceptable assertion claims
    /// - [`ClaimViolation::UnauthenticatedClient`] for an unregistered public client
    pub async fn verify(&self, auth: &ClientAuthentication) -> Result<VerifiedClient> {
        self.verify_at(auth, Utc::now()).await
    }

    /// Verify a presented client credential as of `now`
    ///
    /// # Errors
    ///
    /// Same as [`ClientAuthVerifier::verify`].
    pub async fn verify_at(
        &self,
        auth: &ClientAuthentication,
        now: DateTime<Utc>,
    ) -> Result<VerifiedClient> {
        let method = auth.method();

        if method != ClientAuthMethod::None
            && let Some(client_id) = auth.client_id()
            && let Some(registered) = self.selector.registered_method(client_id).await?
            && registered != method
        {
            warn!(
                client_id = %client_id,
                presented = %method,
                registered = %registered,
                "Client authentication method mismatch"
            );
            return Err(ClaimViolation::AuthMethodMismatch.into());
        }

        let verified = match auth {
            ClientAuthentication::SecretBasic { client_id, secret }
            | ClientAuthentication::SecretPost { client_id, secret } => {
                self.verify_secret(client_id, secret, method, now).await?;
                VerifiedClient {
                    client_id: client_id.clone(),
                    method,
                    assertion: None,
                }
            }
            ClientAuthentication::ClientSecretJwt(jwt) => {
                let candidates: Vec<JwsVerificationKey> = self
                    .selector
                    .select_client_secrets(jwt.client_id(), method)
                    .await?
                    .iter()
                    .filter(|secret| !secret.is_expired_at(now))
                    .map(JwsVerificationKey::from_secret)
                    .collect();
                self.verify_assertion(jwt.assertion(), jwt.client_id(), &candidates, method, now)?
            }
            ClientAuthentication::PrivateKeyJwt(jwt) => {
                let candidates = self
                    .selector
                    .select_public_keys(jwt.client_id(), jwt.assertion().header())
                    .await?;
                self.verify_assertion(jwt.assertion(), jwt.client_id(), &candidates, method, now)?
            }
            ClientAuthentication::None { client_id } => {
                let Some(client_id) = client_id else {
                    warn!("Public client request without client_id");
                    return Err(ClaimViolation::UnauthenticatedClient.into());
                };
                if self.selector.registered_method(client_id).await? != Some(ClientAuthMethod::None) {
                    warn!(client_id = %client_id, "Client is not registered as a public client");
                    return Err(ClaimViolation::UnauthenticatedClient.into());
                }
                VerifiedClient {
                    client_id: client_id.clone(),
                    method,
                    assertion: None,
                }
            }
        };

        debug!(
            client_id = %verified.client_id,
            method = %verified.method,
            "Client authentication successful"
        );
        Ok(verified)
    }

    async fn verify_secret(
        &self,
        client_id: &ClientId,
        presented: &Secret,
        method: ClientAuthMethod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let registered = self.selector.select_client_secrets(client_id, method).await?;
        let usable: Vec<&Secret> = registered
            .iter()
            .filter(|secret| !secret.is_expired_at(now))
            .collect();
        if usable.is_empty() {
            warn!(client_id = %client_id, method = %method, "No usable client secret registered");
            return Err(CryptoFailure::NoMatchingKey.into());
        }

        // Compare against every secret so timing does not reveal which matched
        let matched = usable
            .iter()
            .fold(false, |found, secret| found | secret.matches(presented));
        if !matched {
            warn!(client_id = %client_id, method = %method, "Invalid client secret");
            return Err(CryptoFailure::InvalidSecret.into());
        }
        Ok(())
    }

    fn verify_assertion(
        &self,
        assertion: &SignedJwt,
        client_id: &ClientId,
        candidates: &[JwsVerificationKey],
        method: ClientAuthMethod,
        now: DateTime<Utc>,
    ) -> Result<VerifiedClient> {
        if candidates.is_empty() {
            warn!(client_id = %client_id, method = %method, "No registered key for client assertion");
            return Err(CryptoFailure::NoMatchingKey.into());
        }
        if jws::verify_with_any(assertion, candidates)?.is_none() {
            warn!(
                client_id = %client_id,
                algorithm = %assertion.algorithm(),
                candidates = candidates.len(),
                "Client assertion signature invalid"
            );
            return Err(CryptoFailure::InvalidSignature.into());
        }

        let claims = assertion.claims();
        ClaimsVerifier::new(
            Issuer::new(client_id.as_str())?,
            self.expected_audience.clone(),
            self.clock_skew,
        )
        .verify_at(claims, None, now)?;
        if claims.subject.as_ref().map(|sub| sub.as_str()) != Some(client_id.as_str()) {
            warn!(client_id = %client_id, "Client assertion subject mismatch");
            return Err(ClaimViolation::SubjectMismatch.into());
        }

        Ok(VerifiedClient {
            client_id: client_id.clone(),
            method,
            assertion: Some(VerifiedClientAssertion::from_verified(
                client_id.clone(),
                claims.clone(),
            )?),
        })
    }
}
