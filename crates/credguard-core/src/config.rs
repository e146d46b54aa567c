//! Claims verifier configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::{AudienceSet, ClientId, Issuer};
use crate::time;
use crate::verifier::ClaimsVerifier;

/// Serializable description of a [`ClaimsVerifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsVerifierConfig {
    /// Expected `iss`
    pub issuer: Issuer,
    /// Accepted `aud` values (at least one)
    pub audiences: Vec<String>,
    /// Required `azp` when several audiences are present
    #[serde(default)]
    pub authorized_party: Option<ClientId>,
    /// Clock skew tolerance in seconds (default: 60)
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,
}

pub(crate) fn default_clock_skew_seconds() -> u64 {
    crate::DEFAULT_CLOCK_SKEW_SECS
}

impl ClaimsVerifierConfig {
    /// Build the verifier
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if no audience is configured and
    /// [`crate::Error::MalformedInput`] if an audience is an empty string.
    pub fn build(&self) -> Result<ClaimsVerifier> {
        let audiences = AudienceSet::from_strings(self.audiences.iter().cloned())?;
        let verifier = ClaimsVerifier::new(
            self.issuer.clone(),
            audiences,
            time::skew_from_secs(self.clock_skew_seconds),
        );
        Ok(match &self.authorized_party {
            Some(azp) => verifier.with_expected_authorized_party(azp.clone()),
            None => verifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_config_defaults() {
        let config: ClaimsVerifierConfig = serde_json::from_str(
            r#"{"issuer": "https://c2id.com", "audiences": ["123"]}"#,
        )
        .unwrap();
        assert_eq!(config.clock_skew_seconds, 60);
        assert!(config.authorized_party.is_none());

        let verifier = config.build().unwrap();
        assert_eq!(verifier.clock_skew(), chrono::Duration::seconds(60));
        assert_eq!(verifier.expected_issuer(), "https://c2id.com");
    }

    #[test]
    fn test_config_rejects_empty_audience() {
        let config: ClaimsVerifierConfig =
            serde_json::from_str(r#"{"issuer": "https://c2id.com", "audiences": []}"#).unwrap();
        assert!(matches!(config.build(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_rejects_empty_issuer() {
        let result =
            serde_json::from_str::<ClaimsVerifierConfig>(r#"{"issuer": "", "audiences": ["a"]}"#);
        assert!(result.is_err());
    }
}
