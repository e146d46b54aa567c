//! Shared-secret holder
//!
//! Client secrets are kept in a [`SecretString`] (zeroized on drop, redacted
//! in `Debug`) and only ever compared in constant time.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// A client secret with optional expiration
#[derive(Clone)]
pub struct Secret {
    value: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    /// Wrap a secret value that never expires
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::new(value.into()),
            expires_at: None,
        }
    }

    /// Wrap a secret value expiring at `expires_at`
    pub fn with_expiration(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: SecretString::new(value.into()),
            expires_at: Some(expires_at),
        }
    }

    /// Raw bytes of the secret (UTF-8), used as HMAC key material
    pub fn expose_bytes(&self) -> &[u8] {
        self.value.expose_secret().as_bytes()
    }

    /// Expiration instant, if any
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the secret is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Constant-time comparison against a presented value
    pub fn matches(&self, presented: &Secret) -> bool {
        bool::from(self.expose_bytes().ct_eq(presented.expose_bytes()))
    }
}

impl From<SecretString> for Secret {
    fn from(value: SecretString) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
