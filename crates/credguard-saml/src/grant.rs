//! RFC 7522 SAML 2.0 bearer assertion grant

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use url::form_urlencoded;

use credguard_core::{Error, Result};

/// `grant_type` of a SAML 2.0 bearer assertion grant
pub const SAML2_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:saml2-bearer";

/// Token request carrying a SAML 2.0 bearer assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saml2BearerGrant {
    assertion: String,
    scope: Option<String>,
    client_id: Option<String>,
}

impl Saml2BearerGrant {
    /// Parse an `application/x-www-form-urlencoded` token request body
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the grant type is not
    /// [`SAML2_BEARER_GRANT_TYPE`], a parameter is repeated, or the assertion
    /// is missing or not base64url-encoded UTF-8.
    pub fn parse(form: &[u8]) -> Result<Self> {
        let mut grant_type = None;
        let mut assertion = None;
        let mut scope = None;
        let mut client_id = None;

        for (name, value) in form_urlencoded::parse(form) {
            let slot = match name.as_ref() {
                "grant_type" => &mut grant_type,
                "assertion" => &mut assertion,
                "scope" => &mut scope,
                "client_id" => &mut client_id,
                _ => continue,
            };
            if slot.replace(value.into_owned()).is_some() {
                return Err(Error::malformed(format!("repeated {name} parameter")));
            }
        }

        if grant_type.as_deref() != Some(SAML2_BEARER_GRANT_TYPE) {
            return Err(Error::malformed(format!(
                "grant_type must be {SAML2_BEARER_GRANT_TYPE}"
            )));
        }
        let encoded = assertion
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::malformed("missing assertion parameter"))?;
        let decoded = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| Error::malformed(format!("assertion is not base64url: {e}")))?;
        let assertion = String::from_utf8(decoded)
            .map_err(|_| Error::malformed("assertion is not UTF-8"))?;

        Ok(Self {
            assertion,
            scope,
            client_id,
        })
    }

    /// Decoded assertion XML
    pub fn assertion(&self) -> &str {
        &self.assertion
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// `client_id` when the client did not authenticate otherwise
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}
