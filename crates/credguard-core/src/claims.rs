//! Generic claims set
//!
//! The parsed, not yet verified content of a token or assertion. Registered
//! claims get typed fields; everything else stays in an open map.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::id::{Audience, Issuer, JwtId, Subject};

/// Registered claim names handled by typed fields
const REGISTERED: [&str; 7] = ["iss", "sub", "aud", "exp", "nbf", "iat", "jti"];

/// Claims carried by a token or assertion
///
/// Every time field is optional here; whether its absence is acceptable is the
/// verifier's decision (a missing expiration is always a failure).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimsSet {
    /// `iss`
    pub issuer: Option<Issuer>,
    /// `sub`
    pub subject: Option<Subject>,
    /// `aud`, in document order
    pub audience: Vec<Audience>,
    /// `exp`
    pub expiration: Option<DateTime<Utc>>,
    /// `nbf`
    pub not_before: Option<DateTime<Utc>>,
    /// `iat`
    pub issued_at: Option<DateTime<Utc>>,
    /// `jti`
    pub jwt_id: Option<JwtId>,
    /// All non-registered claims
    pub other: Map<String, Value>,
}

impl ClaimsSet {
    /// Parse a JSON object payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the payload is not a JSON object or a
    /// registered claim has the wrong type.
    pub fn from_json_slice(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Err(Error::malformed("claims payload must be a JSON object")),
        }
    }

    /// Build from an already-decoded JSON object
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if a registered claim has the wrong type.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self> {
        let issuer = take_string(&mut map, "iss")?.map(Issuer::new).transpose()?;
        let subject = take_string(&mut map, "sub")?
            .map(Subject::new)
            .transpose()?;
        let audience = take_audience(&mut map)?;
        let expiration = take_date(&mut map, "exp")?;
        let not_before = take_date(&mut map, "nbf")?;
        let issued_at = take_date(&mut map, "iat")?;
        let jwt_id = take_string(&mut map, "jti")?.map(JwtId::new).transpose()?;

        debug_assert!(REGISTERED.iter().all(|name| !map.contains_key(*name)));

        Ok(Self {
            issuer,
            subject,
            audience,
            expiration,
            not_before,
            issued_at,
            jwt_id,
            other: map,
        })
    }

    /// Raw value of a non-registered claim
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.other.get(name)
    }

    /// String value of a non-registered claim; non-string values yield `None`
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.other.get(name).and_then(Value::as_str)
    }

    /// NumericDate value of a non-registered claim (e.g. `auth_time`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the claim is present but not a number.
    pub fn date_claim(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.other
            .get(name)
            .map(|value| numeric_date(name, value))
            .transpose()
    }

    /// String-or-array-of-strings claim (e.g. `amr`)
    pub fn string_list_claim(&self, name: &str) -> Option<Vec<&str>> {
        match self.other.get(name)? {
            Value::String(s) => Some(vec![s.as_str()]),
            Value::Array(values) => values.iter().map(Value::as_str).collect(),
            _ => None,
        }
    }

    /// Serialize back into a JSON object (registered claims as NumericDate seconds)
    pub fn to_json(&self) -> Value {
        let mut map = self.other.clone();
        if let Some(iss) = &self.issuer {
            map.insert("iss".into(), Value::String(iss.to_string()));
        }
        if let Some(sub) = &self.subject {
            map.insert("sub".into(), Value::String(sub.to_string()));
        }
        match self.audience.as_slice() {
            [] => {}
            [single] => {
                map.insert("aud".into(), Value::String(single.to_string()));
            }
            many => {
                map.insert(
                    "aud".into(),
                    Value::Array(many.iter().map(|a| Value::String(a.to_string())).collect()),
                );
            }
        }
        for (name, date) in [
            ("exp", self.expiration),
            ("nbf", self.not_before),
            ("iat", self.issued_at),
        ] {
            if let Some(date) = date {
                map.insert(name.into(), Value::from(date.timestamp()));
            }
        }
        if let Some(jti) = &self.jwt_id {
            map.insert("jti".into(), Value::String(jti.to_string()));
        }
        Value::Object(map)
    }
}

fn take_string(map: &mut Map<String, Value>, name: &str) -> Result<Option<String>> {
    match map.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::malformed(format!("claim '{name}' must be a string"))),
    }
}

fn take_audience(map: &mut Map<String, Value>) -> Result<Vec<Audience>> {
    match map.remove("aud") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![Audience::new(s)?]),
        Some(Value::Array(values)) => values
            .into_iter()
            .map(|value| match value {
                Value::String(s) => Audience::new(s),
                _ => Err(Error::malformed("claim 'aud' must contain only strings")),
            })
            .collect(),
        Some(_) => Err(Error::malformed(
            "claim 'aud' must be a string or an array of strings",
        )),
    }
}

fn take_date(map: &mut Map<String, Value>, name: &str) -> Result<Option<DateTime<Utc>>> {
    match map.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => numeric_date(name, &value).map(Some),
    }
}

/// Convert a JSON NumericDate (seconds since the epoch, possibly fractional)
fn numeric_date(name: &str, value: &Value) -> Result<DateTime<Utc>> {
    let seconds = if let Some(secs) = value.as_i64() {
        secs
    } else if let Some(secs) = value.as_f64() {
        if !secs.is_finite() {
            return Err(Error::malformed(format!("claim '{name}' is not a finite number")));
        }
        secs.floor() as i64
    } else {
        return Err(Error::malformed(format!("claim '{name}' must be a NumericDate")));
    };

    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| Error::malformed(format!("claim '{name}' is out of range")))
}
