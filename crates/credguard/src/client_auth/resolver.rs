//! Classifying a token request into a client authentication method
//!
//! Rules are tried in a fixed order and the first match wins:
//!
//! 1. `Authorization: Basic ...` header
//! 2. `client_id` + `client_secret` form parameters
//! 3. `client_assertion` with the JWT bearer assertion type
//! 4. anything else is a public client (`none`)

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{Method, Request, header};
use tracing::{debug, warn};

use credguard_core::{ClientId, Error, Result, Secret};

use super::ClientAuthentication;
use super::assertion::{ClientSecretJwt, PrivateKeyJwt};
use crate::jose::{AlgorithmFamily, SignedJwt};

/// `client_assertion_type` for JWT bearer client assertions (RFC 7523)
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

impl ClientAuthentication {
    /// Classify a token request
    ///
    /// Form parameters are only read from `POST` requests with an
    /// `application/x-www-form-urlencoded` body.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedInput`] for an undecodable Basic header, a repeated
    ///   form parameter, an assertion that is not a signed JWT, or a
    ///   `client_id` parameter that disagrees with the assertion subject
    /// - [`Error::UnsupportedAlgorithm`] for an assertion signed with neither
    ///   an HMAC, RSA nor EC algorithm
    pub fn parse<B: AsRef<[u8]>>(request: &Request<B>) -> Result<Self> {
        // Non-Basic schemes fall through to the form rules
        if let Some(value) = request.headers().get(header::AUTHORIZATION)
            && let Some(credentials) = value.as_bytes().strip_prefix(b"Basic")
        {
            let credentials = std::str::from_utf8(credentials)
                .map_err(|_| Error::malformed("Basic credentials are not valid ASCII"))?;
            return parse_basic(credentials.trim());
        }

        let params = if is_form_post(request) {
            parse_form(request.body().as_ref())?
        } else {
            HashMap::new()
        };

        if let (Some(client_id), Some(secret)) = (params.get("client_id"), params.get("client_secret"))
        {
            debug!(client_id = %client_id, "Resolved client_secret_post");
            return Ok(Self::SecretPost {
                client_id: ClientId::new(client_id.as_str())?,
                secret: Secret::new(secret.as_str()),
            });
        }

        if let Some(assertion) = params.get("client_assertion")
            && params.get("client_assertion_type").map(String::as_str)
                == Some(JWT_BEARER_ASSERTION_TYPE)
        {
            return parse_assertion(assertion, params.get("client_id").map(String::as_str));
        }

        let client_id = params
            .get("client_id")
            .filter(|id| !id.is_empty())
            .map(|id| ClientId::new(id.as_str()))
            .transpose()?;
        debug!(client_id = ?client_id, "Resolved unauthenticated client");
        Ok(Self::None { client_id })
    }
}

fn parse_basic(credentials: &str) -> Result<ClientAuthentication> {
    let decoded = STANDARD
        .decode(credentials)
        .map_err(|_| Error::malformed("Basic credentials are not valid base64"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| Error::malformed("Basic credentials are not valid UTF-8"))?;
    let (client_id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| Error::malformed("Basic credentials are missing the ':' separator"))?;

    let client_id = form_decode(client_id)?;
    debug!(client_id = %client_id, "Resolved client_secret_basic");
    Ok(ClientAuthentication::SecretBasic {
        client_id: ClientId::new(client_id)?,
        secret: Secret::new(form_decode(secret)?),
    })
}

/// `application/x-www-form-urlencoded` decoding of one Basic credential part
fn form_decode(value: &str) -> Result<String> {
    urlencoding::decode(&value.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::malformed("Basic credentials are not valid form-encoded UTF-8"))
}

fn is_form_post<B>(request: &Request<B>) -> bool {
    request.method() == Method::POST
        && request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .get(..FORM_CONTENT_TYPE.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FORM_CONTENT_TYPE))
            })
}

fn parse_form(body: &[u8]) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for (name, value) in url::form_urlencoded::parse(body) {
        if params.insert(name.to_string(), value.into_owned()).is_some() {
            return Err(Error::malformed(format!(
                "form parameter '{name}' must not repeat"
            )));
        }
    }
    Ok(params)
}

fn parse_assertion(assertion: &str, client_id: Option<&str>) -> Result<ClientAuthentication> {
    let jwt = SignedJwt::parse(assertion)?;
    let algorithm = jwt.algorithm();

    let auth = match algorithm.family() {
        AlgorithmFamily::Hmac => ClientAuthentication::ClientSecretJwt(ClientSecretJwt::new(jwt)?),
        AlgorithmFamily::Rsa | AlgorithmFamily::Ec => {
            ClientAuthentication::PrivateKeyJwt(PrivateKeyJwt::new(jwt)?)
        }
        AlgorithmFamily::Ed | AlgorithmFamily::None => {
            warn!(algorithm = %algorithm, "Client assertion algorithm not supported");
            return Err(Error::UnsupportedAlgorithm(algorithm.to_string()));
        }
    };

    if let (Some(expected), Some(claimed)) = (client_id, auth.client_id())
        && expected != claimed.as_str()
    {
        warn!(client_id = expected, subject = %claimed, "client_id does not match assertion subject");
        return Err(Error::malformed(
            "client_id parameter does not match the client assertion subject",
        ));
    }

    debug!(method = %auth.method(), algorithm = %algorithm, "Resolved client assertion");
    Ok(auth)
}
