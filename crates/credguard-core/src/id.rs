//! Identifier value types
//!
//! Issuers, subjects, client identifiers and audiences are opaque, non-empty
//! strings compared by exact string equality. No normalization (case folding,
//! trailing slash removal, ...) is ever applied.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create the identifier, rejecting empty values
            ///
            /// # Errors
            ///
            /// Returns [`Error::MalformedInput`] if `value` is empty.
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                if value.is_empty() {
                    return Err(Error::malformed(concat!(stringify!($name), " must not be empty")));
                }
                Ok(Self(value))
            }

            /// Borrow the raw value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Take the raw value
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

identifier!(
    /// Issuer identifier (`iss`)
    Issuer
);
identifier!(
    /// Subject identifier (`sub`)
    Subject
);
identifier!(
    /// OAuth 2.0 client identifier
    ClientId
);
identifier!(
    /// Intended recipient of a token or assertion (`aud`)
    Audience
);
identifier!(
    /// Unique token / assertion identifier (`jti`, SAML `ID`)
    JwtId
);
identifier!(
    /// Request-binding nonce
    Nonce
);

impl From<ClientId> for Audience {
    fn from(value: ClientId) -> Self {
        Audience(value.0)
    }
}

impl Audience {
    /// Whether this audience is a member of `set`
    pub fn matches_any(&self, set: &AudienceSet) -> bool {
        set.contains(self)
    }
}

/// Non-empty set of acceptable audiences
///
/// Built eagerly at validator construction time, so an empty expected
/// audience is a configuration error and never a call-time surprise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceSet(BTreeSet<Audience>);

impl AudienceSet {
    /// Build a set from one or more audiences
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no audience is supplied.
    pub fn new(audiences: impl IntoIterator<Item = Audience>) -> Result<Self> {
        let set: BTreeSet<Audience> = audiences.into_iter().collect();
        if set.is_empty() {
            return Err(Error::Configuration(
                "expected audience set must not be empty".to_string(),
            ));
        }
        Ok(Self(set))
    }

    /// Single-member set
    pub fn single(audience: Audience) -> Self {
        Self(BTreeSet::from([audience]))
    }

    /// Parse raw strings into a set
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] for an empty string and
    /// [`Error::Configuration`] for an empty list.
    pub fn from_strings<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let audiences = values
            .into_iter()
            .map(Audience::new)
            .collect::<Result<Vec<_>>>()?;
        Self::new(audiences)
    }

    /// Membership test
    pub fn contains(&self, audience: &Audience) -> bool {
        self.0.contains(audience)
    }

    /// Whether any of `audiences` is a member
    pub fn intersects(&self, audiences: &[Audience]) -> bool {
        audiences.iter().any(|aud| self.0.contains(aud))
    }

    /// Add another accepted audience
    pub fn insert(&mut self, audience: Audience) {
        self.0.insert(audience);
    }

    /// Iterate members in order
    pub fn iter(&self) -> impl Iterator<Item = &Audience> {
        self.0.iter()
    }

    /// Number of members (always at least one)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; present for API symmetry
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
