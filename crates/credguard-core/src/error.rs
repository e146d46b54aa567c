//! Error taxonomy shared by every credguard validator
//!
//! Every validation call returns exactly one typed failure. Failures are never
//! retried and never downgraded: a single failed check aborts the whole
//! validation.

use thiserror::Error;

/// Result type for credguard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Input could not be parsed into the expected representation
    /// (bad base64, JSON, XML, segment count, ...)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A required SAML assertion element is missing
    #[error("Malformed assertion: missing {0}")]
    MalformedAssertion(AssertionElement),

    /// Signature, MAC, secret or decryption check failed
    #[error("Cryptographic failure: {0}")]
    Crypto(#[from] CryptoFailure),

    /// Claims are well-formed and authentic but not acceptable
    #[error("Claim violation: {0}")]
    Claim(#[from] ClaimViolation),

    /// Observed algorithm is outside the set accepted by the configured validator
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Access token / authorization code hash does not bind to the token
    #[error("Invalid hash binding")]
    InvalidHash,

    /// Validator or verifier was constructed with unusable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A key or credential collaborator failed (network, remote key set parse)
    #[error("Key source error: {0}")]
    KeySource(String),
}

/// Cryptographic failures (always fatal)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoFailure {
    /// The key selector returned no candidate keys
    #[error("no matching key")]
    NoMatchingKey,

    /// No candidate key verified the signature / MAC
    #[error("invalid signature")]
    InvalidSignature,

    /// No candidate key decrypted the token
    #[error("decryption failed")]
    DecryptionFailed,

    /// Presented client secret matched no registered secret
    #[error("invalid client secret")]
    InvalidSecret,

    /// A signature was required but none was present
    #[error("missing signature")]
    MissingSignature,
}

/// Semantic claim violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimViolation {
    #[error("missing or wrong issuer")]
    MissingOrWrongIssuer,

    #[error("missing subject")]
    MissingSubject,

    #[error("subject does not match the expected value")]
    SubjectMismatch,

    #[error("missing audience")]
    MissingAudience,

    #[error("audience does not match")]
    AudienceMismatch,

    #[error("authorized party does not match")]
    AuthorizedPartyMismatch,

    #[error("missing expiration")]
    MissingExpiration,

    #[error("expired")]
    Expired,

    #[error("not yet valid")]
    NotYetValid,

    #[error("issued in the future")]
    IssuedInFuture,

    #[error("missing nonce")]
    MissingNonce,

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("missing auth_time")]
    MissingAuthTime,

    #[error("authentication too old")]
    AuthTimeTooOld,

    #[error("no bearer subject confirmation")]
    NoBearerConfirmation,

    #[error("authentication method does not match registration")]
    AuthMethodMismatch,

    #[error("client is not registered for unauthenticated access")]
    UnauthenticatedClient,
}

/// Required SAML 2.0 assertion elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionElement {
    Issuer,
    Subject,
    SubjectConfirmation,
    Conditions,
    AssertionId,
    IssueInstant,
}

impl std::fmt::Display for AssertionElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssertionElement::Issuer => "Issuer",
            AssertionElement::Subject => "Subject",
            AssertionElement::SubjectConfirmation => "SubjectConfirmation",
            AssertionElement::Conditions => "Conditions",
            AssertionElement::AssertionId => "ID",
            AssertionElement::IssueInstant => "IssueInstant",
        };
        f.write_str(name)
    }
}

/// Coarse failure category, sufficient to pick a protocol-level error response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    CryptographicFailure,
    ClaimViolation,
    UnsupportedAlgorithm,
    InvalidHash,
    ConfigurationError,
    KeySource,
}

impl Error {
    /// Taxonomy bucket of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedInput(_) | Error::MalformedAssertion(_) => ErrorKind::MalformedInput,
            Error::Crypto(_) => ErrorKind::CryptographicFailure,
            Error::Claim(_) => ErrorKind::ClaimViolation,
            Error::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Error::InvalidHash => ErrorKind::InvalidHash,
            Error::Configuration(_) => ErrorKind::ConfigurationError,
            Error::KeySource(_) => ErrorKind::KeySource,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::MalformedInput(_) => "malformed_input",
            Error::MalformedAssertion(_) => "malformed_assertion",
            Error::Crypto(CryptoFailure::NoMatchingKey) => "no_matching_key",
            Error::Crypto(CryptoFailure::InvalidSignature) => "invalid_signature",
            Error::Crypto(CryptoFailure::DecryptionFailed) => "decryption_failed",
            Error::Crypto(CryptoFailure::InvalidSecret) => "invalid_secret",
            Error::Crypto(CryptoFailure::MissingSignature) => "missing_signature",
            Error::Claim(_) => "claim_violation",
            Error::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Error::InvalidHash => "invalid_hash",
            Error::Configuration(_) => "configuration_error",
            Error::KeySource(_) => "key_source",
        }
    }

    /// Shorthand for [`Error::MalformedInput`]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedInput(msg.into())
    }

    /// The claim violation carried by this error, if any
    pub fn claim_violation(&self) -> Option<ClaimViolation> {
        match self {
            Error::Claim(violation) => Some(*violation),
            _ => None,
        }
    }

    /// The cryptographic failure carried by this error, if any
    pub fn crypto_failure(&self) -> Option<CryptoFailure> {
        match self {
            Error::Crypto(failure) => Some(*failure),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::MalformedInput(format!("invalid JSON: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            Error::from(ClaimViolation::Expired).kind(),
            ErrorKind::ClaimViolation
        );
        assert_eq!(
            Error::from(CryptoFailure::InvalidSignature).kind(),
            ErrorKind::CryptographicFailure
        );
        assert_eq!(
            Error::MalformedAssertion(AssertionElement::Issuer).kind(),
            ErrorKind::MalformedInput
        );
        assert_eq!(Error::InvalidHash.kind(), ErrorKind::InvalidHash);
    }

    #[test]
    fn test_error_display() {
        let error = Error::from(ClaimViolation::AudienceMismatch);
        assert_eq!(error.to_string(), "Claim violation: audience does not match");

        let error = Error::MalformedAssertion(AssertionElement::IssueInstant);
        assert_eq!(error.to_string(), "Malformed assertion: missing IssueInstant");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::from(CryptoFailure::DecryptionFailed).category(),
            "decryption_failed"
        );
        assert_eq!(Error::malformed("x").category(), "malformed_input");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert_eq!(error.kind(), ErrorKind::MalformedInput);
    }
}
