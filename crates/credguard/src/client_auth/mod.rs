//! OAuth 2.0 client authentication at the token endpoint
//!
//! - [`ClientAuthentication::parse`] classifies an HTTP request into exactly
//!   one authentication method
//! - [`ClientAuthVerifier`] checks the presented credential against the
//!   client's registered secrets or public keys
//!
//! Supported methods: `client_secret_basic`, `client_secret_post`,
//! `client_secret_jwt`, `private_key_jwt` and `none` (public clients).

pub mod assertion;
pub mod resolver;
pub mod verifier;

use std::fmt;

use serde::{Deserialize, Serialize};

use credguard_core::{ClientId, Secret};

pub use assertion::{ClientAssertionClaims, ClientSecretJwt, PrivateKeyJwt, VerifiedClientAssertion};
pub use resolver::JWT_BEARER_ASSERTION_TYPE;
pub use verifier::{
    ClientAuthVerifier, ClientCredentialsSelector, StaticClientRegistry, VerifiedClient,
};

/// Registered client authentication method (`token_endpoint_auth_method`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// HTTP Basic with client id and secret
    ClientSecretBasic,
    /// Client id and secret in the form body
    ClientSecretPost,
    /// JWT assertion MAC'ed with the client secret
    ClientSecretJwt,
    /// JWT assertion signed with the client's private key
    PrivateKeyJwt,
    /// Public client
    None,
}

impl ClientAuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::None => "none",
        }
    }

    /// Whether the method authenticates with a shared secret
    pub fn uses_shared_secret(self) -> bool {
        matches!(
            self,
            Self::ClientSecretBasic | Self::ClientSecretPost | Self::ClientSecretJwt
        )
    }
}

impl fmt::Display for ClientAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client credential presented with a token request
#[derive(Debug, Clone)]
pub enum ClientAuthentication {
    /// `client_secret_basic`
    SecretBasic { client_id: ClientId, secret: Secret },
    /// `client_secret_post`
    SecretPost { client_id: ClientId, secret: Secret },
    /// `client_secret_jwt`
    ClientSecretJwt(ClientSecretJwt),
    /// `private_key_jwt`
    PrivateKeyJwt(PrivateKeyJwt),
    /// `none`, with the `client_id` form parameter if one was sent
    None { client_id: Option<ClientId> },
}

impl ClientAuthentication {
    /// Method of the presented credential
    pub fn method(&self) -> ClientAuthMethod {
        match self {
            Self::SecretBasic { .. } => ClientAuthMethod::ClientSecretBasic,
            Self::SecretPost { .. } => ClientAuthMethod::ClientSecretPost,
            Self::ClientSecretJwt(_) => ClientAuthMethod::ClientSecretJwt,
            Self::PrivateKeyJwt(_) => ClientAuthMethod::PrivateKeyJwt,
            Self::None { .. } => ClientAuthMethod::None,
        }
    }

    /// Claimed client identifier
    ///
    /// For assertions this is the assertion's `sub`; it is not authenticated
    /// until [`ClientAuthVerifier::verify`] succeeds.
    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            Self::SecretBasic { client_id, .. } | Self::SecretPost { client_id, .. } => {
                Some(client_id)
            }
            Self::ClientSecretJwt(jwt) => Some(jwt.client_id()),
            Self::PrivateKeyJwt(jwt) => Some(jwt.client_id()),
            Self::None { client_id } => client_id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        for method in [
            ClientAuthMethod::ClientSecretBasic,
            ClientAuthMethod::ClientSecretPost,
            ClientAuthMethod::ClientSecretJwt,
            ClientAuthMethod::PrivateKeyJwt,
            ClientAuthMethod::None,
        ] {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            assert_eq!(method.to_string(), method.as_str());
        }
        assert!(ClientAuthMethod::ClientSecretJwt.uses_shared_secret());
        assert!(!ClientAuthMethod::PrivateKeyJwt.uses_shared_secret());
    }

    #[test]
    fn test_client_id_and_method() {
        let auth = ClientAuthentication::SecretBasic {
            client_id: ClientId::new("123").unwrap(),
            secret: Secret::new("s3cr3t"),
        };
        assert_eq!(auth.method(), ClientAuthMethod::ClientSecretBasic);
        assert_eq!(auth.client_id().unwrap(), "123");
        assert!(!format!("{auth:?}").contains("s3cr3t"));

        let public = ClientAuthentication::None { client_id: None };
        assert_eq!(public.method(), ClientAuthMethod::None);
        assert!(public.client_id().is_none());
    }
}
