//! Shared fixtures and signing helpers for SAML integration tests
//!
//! The two fixture documents were signed by an external XML-DSig stack; the
//! [`AssertionTemplate`] helper signs freshly built assertions with the fixture
//! keys so individual conditions can be varied.

#![allow(dead_code)]

use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use p256::ecdsa::signature::Signer as _;
use roxmltree::Document;
use rsa::pkcs8::DecodePrivateKey as _;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use credguard_core::{AudienceSet, Issuer};
use credguard_saml::c14n::ExclusiveCanonicalizer;
use credguard_saml::dsig::XMLDSIG_NAMESPACE;
use credguard_saml::{DigestAlgorithm, Saml2AssertionVerifier, SamlVerificationKey, SignatureAlgorithm};

pub const IDP_ISSUER: &str = "https://idp.example.com";
pub const SP_AUDIENCE: &str = "https://c2id.com";
pub const TOKEN_ENDPOINT: &str = "https://c2id.com/token";

pub const RSA_FIXTURE: &str = include_str!("../fixtures/rsa_sha256_assertion.xml");
pub const RSA_FIXTURE_ID: &str = "_a75adf55-01d7-40cc-929f-dbd8372ebdfc";
pub const EC_FIXTURE: &str = include_str!("../fixtures/ecdsa_sha1_digest_assertion.xml");
pub const IDP_CERTIFICATE_PEM: &str = include_str!("../fixtures/idp_rsa_cert.pem");
pub const IDP_RSA_KEY_PEM: &str = include_str!("../fixtures/idp_rsa_key.pem");
pub const IDP_EC_PUBLIC_PEM: &str = include_str!("../fixtures/idp_ec_public.pem");

/// Instant at which both fixtures are valid (between NotBefore and NotOnOrAfter)
pub fn fixture_now() -> DateTime<Utc> {
    instant("2024-06-01T12:01:00Z")
}

pub fn instant(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
}

pub fn idp_rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::from_pkcs8_pem(IDP_RSA_KEY_PEM).unwrap())
}

pub fn certificate_key() -> SamlVerificationKey {
    SamlVerificationKey::from_x509_pem(IDP_CERTIFICATE_PEM).unwrap()
}

pub fn ec_fixture_key() -> SamlVerificationKey {
    SamlVerificationKey::from_spki_pem(IDP_EC_PUBLIC_PEM).unwrap()
}

pub fn verifier(keys: Vec<SamlVerificationKey>) -> Saml2AssertionVerifier {
    Saml2AssertionVerifier::new(
        Issuer::new(IDP_ISSUER).unwrap(),
        AudienceSet::from_strings([SP_AUDIENCE, TOKEN_ENDPOINT]).unwrap(),
        keys,
    )
    .unwrap()
}

/// Signing key for freshly built assertions
pub enum TestSigner {
    Rsa(SignatureAlgorithm),
    Ec(p256::ecdsa::SigningKey),
}

impl TestSigner {
    pub fn rsa_sha256() -> Self {
        Self::Rsa(SignatureAlgorithm::RsaSha256)
    }

    pub fn random_ec() -> Self {
        Self::Ec(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Rsa(algorithm) => *algorithm,
            Self::Ec(_) => SignatureAlgorithm::EcdsaSha256,
        }
    }

    pub fn verification_key(&self) -> SamlVerificationKey {
        match self {
            Self::Rsa(_) => SamlVerificationKey::Rsa(idp_rsa_key().to_public_key()),
            Self::Ec(key) => SamlVerificationKey::EcP256(p256::ecdsa::VerifyingKey::from(key)),
        }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Rsa(SignatureAlgorithm::RsaSha1) => idp_rsa_key()
                .sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(message))
                .unwrap(),
            Self::Rsa(_) => idp_rsa_key()
                .sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(message))
                .unwrap(),
            Self::Ec(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
        }
    }
}

fn xml_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Assertion whose conditions can be varied before signing
#[derive(Debug, Clone)]
pub struct AssertionTemplate {
    pub id: String,
    pub issuer: String,
    pub name_id: String,
    pub issue_instant: DateTime<Utc>,
    pub audiences: Vec<String>,
    pub recipient: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub confirmation_not_on_or_after: Option<DateTime<Utc>>,
    pub with_conditions: bool,
    pub reference_uri: Option<String>,
    pub digest: DigestAlgorithm,
}

impl AssertionTemplate {
    /// Valid for five minutes from `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("_{}", now.timestamp_nanos_opt().unwrap_or_default()),
            issuer: IDP_ISSUER.to_string(),
            name_id: "alice@example.com".to_string(),
            issue_instant: now,
            audiences: vec![SP_AUDIENCE.to_string()],
            recipient: Some(TOKEN_ENDPOINT.to_string()),
            not_before: Some(now - Duration::seconds(5)),
            not_on_or_after: Some(now + Duration::minutes(5)),
            confirmation_not_on_or_after: Some(now + Duration::minutes(5)),
            with_conditions: true,
            reference_uri: None,
            digest: DigestAlgorithm::Sha256,
        }
    }

    pub fn unsigned_xml(&self) -> String {
        self.render("")
    }

    fn render(&self, signature: &str) -> String {
        let mut confirmation_data = String::from("<saml:SubjectConfirmationData");
        if let Some(not_on_or_after) = self.confirmation_not_on_or_after {
            confirmation_data.push_str(&format!(r#" NotOnOrAfter="{}""#, xml_time(not_on_or_after)));
        }
        if let Some(recipient) = &self.recipient {
            confirmation_data.push_str(&format!(r#" Recipient="{recipient}""#));
        }
        confirmation_data.push_str("/>");

        let conditions = if self.with_conditions {
            let mut open = String::from("<saml:Conditions");
            if let Some(not_before) = self.not_before {
                open.push_str(&format!(r#" NotBefore="{}""#, xml_time(not_before)));
            }
            if let Some(not_on_or_after) = self.not_on_or_after {
                open.push_str(&format!(r#" NotOnOrAfter="{}""#, xml_time(not_on_or_after)));
            }
            let audiences: String = self
                .audiences
                .iter()
                .map(|audience| format!("<saml:Audience>{audience}</saml:Audience>"))
                .collect();
            if audiences.is_empty() {
                format!("{open}/>")
            } else {
                format!("{open}><saml:AudienceRestriction>{audiences}</saml:AudienceRestriction></saml:Conditions>")
            }
        } else {
            String::new()
        };

        format!(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" IssueInstant="{issued}" Version="2.0">
  <saml:Issuer>{issuer}</saml:Issuer>{signature}
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">{name_id}</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">{confirmation_data}</saml:SubjectConfirmation>
  </saml:Subject>
  {conditions}
</saml:Assertion>"#,
            id = self.id,
            issued = xml_time(self.issue_instant),
            issuer = self.issuer,
            name_id = self.name_id,
        )
    }

    fn signature_element(&self, algorithm: SignatureAlgorithm, digest: &str, signature: &str) -> String {
        let reference = self
            .reference_uri
            .clone()
            .unwrap_or_else(|| format!("#{}", self.id));
        format!(
            r##"<ds:Signature xmlns:ds="{XMLDSIG_NAMESPACE}"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="{signature_method}"/><ds:Reference URI="{reference}"><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms><ds:DigestMethod Algorithm="{digest_method}"/><ds:DigestValue>{digest}</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue>{signature}</ds:SignatureValue></ds:Signature>"##,
            signature_method = algorithm.uri(),
            digest_method = self.digest.uri(),
        )
    }

    /// Sign with an enveloped signature placed after the `Issuer`
    pub fn sign(&self, signer: &TestSigner) -> String {
        const DIGEST_SLOT: &str = "DIGEST-VALUE";
        const SIGNATURE_SLOT: &str = "SIGNATURE-VALUE";

        let algorithm = signer.algorithm();
        let draft = self.render(&self.signature_element(algorithm, DIGEST_SLOT, SIGNATURE_SLOT));

        let digest = {
            let document = Document::parse(&draft).unwrap();
            let signature = document
                .descendants()
                .find(|node| node.has_tag_name((XMLDSIG_NAMESPACE, "Signature")))
                .unwrap();
            let canonical = ExclusiveCanonicalizer::new()
                .excluding(signature.id())
                .canonicalize(document.root_element());
            STANDARD.encode(self.digest.digest(canonical.as_bytes()))
        };
        let draft = draft.replace(DIGEST_SLOT, &digest);

        let signature = {
            let document = Document::parse(&draft).unwrap();
            let signed_info = document
                .descendants()
                .find(|node| node.has_tag_name((XMLDSIG_NAMESPACE, "SignedInfo")))
                .unwrap();
            let canonical = ExclusiveCanonicalizer::new().canonicalize(signed_info);
            STANDARD.encode(signer.sign(canonical.as_bytes()))
        };
        draft.replace(SIGNATURE_SLOT, &signature)
    }
}

/// Replace the base64 signature value with one that decodes but does not verify
pub fn corrupt_signature_value(xml: &str) -> String {
    let start = xml.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
    let offset = xml[start..]
        .find(|c: char| c.is_ascii_alphanumeric())
        .unwrap();
    let position = start + offset;
    let original = xml.as_bytes()[position];
    let replacement = if original == b'A' { "B" } else { "A" };
    format!("{}{}{}", &xml[..position], replacement, &xml[position + 1..])
}

/// Remove the enveloped `ds:Signature` element
pub fn strip_signature(xml: &str) -> String {
    let start = xml.find("<ds:Signature").unwrap();
    let end = xml.find("</ds:Signature>").unwrap() + "</ds:Signature>".len();
    format!("{}{}", &xml[..start], &xml[end..])
}
