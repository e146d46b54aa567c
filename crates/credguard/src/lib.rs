//! # Credguard - OAuth 2.0 / OpenID Connect Credential Validation
//!
//! Stateless validators for the credentials an OAuth 2.0 authorization server
//! or relying party receives: identity tokens, access token / code hash
//! bindings, token endpoint client authentication and, behind the `saml`
//! feature, SAML 2.0 bearer assertions.
//!
//! ## Architecture
//!
//! - [`jose`] - JWS / JWE parsing, signature verification and decryption
//! - [`keys`] - Key selectors, JWK sources and the cached remote JWK set
//! - [`id_token`] - OpenID Connect ID token validator
//! - [`hash`] - `at_hash` / `c_hash` computation and validation
//! - [`client_auth`] - Client authentication resolver and verifier
//! - [`config`] - Serializable validator configuration
//!
//! Value types, the claims verifier and the error taxonomy live in
//! [`credguard_core`] and are re-exported here.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use credguard::id_token::IdTokenValidator;
//! use credguard::jose::JwsAlgorithm;
//! use credguard::keys::{JwsVerificationKeySelector, RemoteJwkSet};
//! use credguard::{ClientId, Issuer, Nonce};
//!
//! # async fn run(id_token: &str) -> credguard::Result<()> {
//! let jwks = RemoteJwkSet::new("https://c2id.com/jwks.json".parse().map_err(|_| {
//!     credguard::Error::Configuration("bad URL".into())
//! })?)?;
//! let validator = IdTokenValidator::signed(
//!     Issuer::new("https://c2id.com")?,
//!     ClientId::new("123")?,
//!     JwsVerificationKeySelector::new(JwsAlgorithm::RS256, jwks)?,
//! );
//!
//! let nonce = Nonce::new("n-0S6_WzA2Mj")?;
//! let verified = validator.validate(id_token, Some(&nonce)).await?;
//! verified.verify_access_token("2YotnFZFEjr1zCsicMWpAA")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `saml` - SAML 2.0 assertion verification (`credguard-saml`)
//!
//! ## Standards Compliance
//!
//! - **RFC 7515 / 7516 / 7517 / 7518 / 7519** - JWS, JWE, JWK, JWA, JWT
//! - **RFC 6749** - OAuth 2.0 client authentication
//! - **RFC 7523** - JWT client assertions
//! - **OpenID Connect Core 1.0** - ID token validation, hash binding
//! - **RFC 7522** - SAML 2.0 bearer assertions (`saml` feature)

pub mod client_auth;
pub mod config;
pub mod hash;
pub mod id_token;
pub mod jose;
pub mod keys;

#[doc(inline)]
pub use credguard_core::{
    AssertionElement, Audience, AudienceSet, ClaimViolation, ClaimsSet, ClaimsVerifier,
    ClaimsVerifierConfig, ClientId, CryptoFailure, Error, ErrorKind, Issuer, JwtId, Nonce, Result,
    Secret, Subject,
};

pub use client_auth::{ClientAuthMethod, ClientAuthVerifier, ClientAuthentication, VerifiedClient};
pub use config::{
    ClientAuthConfig, IdTokenValidatorConfig, RegisteredClient, RemoteJwkSetConfig,
    RetrieverConfig,
};
pub use hash::HashClaim;
pub use id_token::{IdTokenValidator, VerifiedClaims, VerifiedIdToken};
pub use jose::{EncryptionMethod, JweAlgorithm, JwsAlgorithm};

/// SAML 2.0 assertion verification
#[cfg(feature = "saml")]
pub use credguard_saml as saml;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
