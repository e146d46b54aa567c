//! Clock-skew aware time predicates
//!
//! Skew only ever widens the acceptance window. A skew of zero is strict
//! checking. These predicates are shared by the JWT and SAML verifiers so both
//! apply identical semantics. Arithmetic saturates: a window that overflows the
//! representable range is treated as unbounded on that side.

use chrono::{DateTime, Duration, Utc};

/// Upper bound for a configured skew (100 years)
const MAX_SKEW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Expired unless `now < exp + skew`
pub fn is_expired(expiration: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> bool {
    match expiration.checked_add_signed(skew) {
        Some(limit) => now >= limit,
        None => false,
    }
}

/// Not yet valid unless `now + skew >= nbf`
pub fn is_not_yet_valid(not_before: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> bool {
    match now.checked_add_signed(skew) {
        Some(shifted) => shifted < not_before,
        None => false,
    }
}

/// Issued in the future if `iat > now + skew`
pub fn is_issued_in_future(issued_at: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> bool {
    match now.checked_add_signed(skew) {
        Some(shifted) => issued_at > shifted,
        None => false,
    }
}

/// Convert a configured skew in seconds, clamped to 100 years
pub fn skew_from_secs(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_SKEW_SECS) as i64)
}
