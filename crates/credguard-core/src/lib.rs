//! # credguard-core
//!
//! Value types, the generic claims verifier and the error taxonomy shared by
//! every credguard validator.
//!
//! ## Architecture
//!
//! - `id` - Issuer, subject, client, audience, JWT ID and nonce identifiers
//! - `secret` - Client secrets with expiration and constant-time comparison
//! - `claims` - Parsed (unverified) claims set
//! - `time` - Clock-skew aware time predicates
//! - `verifier` - Issuer / subject / audience / time / nonce verification
//! - `config` - Serializable verifier configuration
//! - `error` - Typed failures

pub mod claims;
pub mod config;
pub mod error;
pub mod id;
pub mod secret;
pub mod time;
pub mod verifier;

pub use claims::ClaimsSet;
pub use config::ClaimsVerifierConfig;
pub use error::{AssertionElement, ClaimViolation, CryptoFailure, Error, ErrorKind, Result};
pub use id::{Audience, AudienceSet, ClientId, Issuer, JwtId, Nonce, Subject};
pub use secret::Secret;
pub use verifier::ClaimsVerifier;

/// Default clock skew tolerance (60 seconds)
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;
