//! Enveloped XML digital signatures over SAML assertions
//!
//! Only the signature shape SAML identity providers actually produce is
//! accepted: a single `ds:Signature` child of the assertion, one `Reference`
//! whose URI names the assertion `ID`, the enveloped-signature transform and
//! exclusive canonicalization. Keys always come from configuration; `KeyInfo`
//! carried in the document is ignored.

use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use p256::ecdsa::signature::Verifier as _;
use p256::pkcs8::DecodePublicKey as _;
use roxmltree::{Document, Node};
use rsa::pkcs8::DecodePublicKey as _;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use x509_cert::Certificate;
use x509_cert::der::{Decode, DecodePem, Encode};

use credguard_core::{AssertionElement, CryptoFailure, Error, Result};

use crate::c14n::{EXCLUSIVE_C14N, EXCLUSIVE_C14N_WITH_COMMENTS, ExclusiveCanonicalizer};

/// `http://www.w3.org/2000/09/xmldsig#`
pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

/// `http://www.w3.org/2000/09/xmldsig#enveloped-signature`
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Reference digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// `http://www.w3.org/2000/09/xmldsig#sha1`
    Sha1,
    /// `http://www.w3.org/2001/04/xmlenc#sha256`
    Sha256,
}

impl DigestAlgorithm {
    /// Algorithm named by a `DigestMethod` URI
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#sha1" => Some(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Algorithm URI
    pub fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
        }
    }

    /// Digest of `data`
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// `SignatureMethod` algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `http://www.w3.org/2000/09/xmldsig#rsa-sha1`
    RsaSha1,
    /// `http://www.w3.org/2001/04/xmldsig-more#rsa-sha256`
    RsaSha256,
    /// `http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256`
    EcdsaSha256,
}

impl SignatureAlgorithm {
    /// Algorithm named by a `SignatureMethod` URI
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => Some(Self::RsaSha1),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Some(Self::RsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256" => Some(Self::EcdsaSha256),
            _ => None,
        }
    }

    /// Algorithm URI
    pub fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::EcdsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256",
        }
    }
}

/// Trusted public key for assertion signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamlVerificationKey {
    Rsa(RsaPublicKey),
    EcP256(p256::ecdsa::VerifyingKey),
}

impl SamlVerificationKey {
    /// Key from a DER `SubjectPublicKeyInfo`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the key is neither RSA nor P-256.
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            return Ok(Self::Rsa(key));
        }
        p256::ecdsa::VerifyingKey::from_public_key_der(der)
            .map(Self::EcP256)
            .map_err(|_| Error::Configuration("unsupported public key: expected RSA or P-256".into()))
    }

    /// Key from a PEM `PUBLIC KEY` block
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the PEM is invalid or the key is
    /// neither RSA nor P-256.
    pub fn from_spki_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        p256::ecdsa::VerifyingKey::from_public_key_pem(pem)
            .map(Self::EcP256)
            .map_err(|_| Error::Configuration("invalid public key PEM: expected RSA or P-256".into()))
    }

    /// Subject public key of a DER X.509 certificate
    ///
    /// The certificate is used as a key container only; its validity period
    /// and chain are not evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the certificate cannot be decoded.
    pub fn from_x509_der(der: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_der(der)
            .map_err(|e| Error::Configuration(format!("invalid X.509 certificate: {e}")))?;
        Self::from_certificate(&certificate)
    }

    /// Subject public key of a PEM X.509 certificate
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the certificate cannot be decoded.
    pub fn from_x509_pem(pem: &str) -> Result<Self> {
        let certificate = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| Error::Configuration(format!("invalid X.509 certificate: {e}")))?;
        Self::from_certificate(&certificate)
    }

    /// Key from either a `CERTIFICATE` or a `PUBLIC KEY` PEM block
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if neither form can be decoded.
    pub fn from_pem(pem: &str) -> Result<Self> {
        if pem.contains("-----BEGIN CERTIFICATE-----") {
            Self::from_x509_pem(pem)
        } else {
            Self::from_spki_pem(pem)
        }
    }

    fn from_certificate(certificate: &Certificate) -> Result<Self> {
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Configuration(format!("invalid certificate public key: {e}")))?;
        Self::from_spki_der(&spki)
    }

    /// Whether this key can check signatures of `algorithm`
    pub fn supports(&self, algorithm: SignatureAlgorithm) -> bool {
        matches!(
            (self, algorithm),
            (Self::Rsa(_), SignatureAlgorithm::RsaSha1 | SignatureAlgorithm::RsaSha256)
                | (Self::EcP256(_), SignatureAlgorithm::EcdsaSha256)
        )
    }

    fn verify(&self, algorithm: SignatureAlgorithm, message: &[u8], signature: &[u8]) -> bool {
        match (self, algorithm) {
            (Self::Rsa(key), SignatureAlgorithm::RsaSha256) => key
                .verify(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(message), signature)
                .is_ok(),
            (Self::Rsa(key), SignatureAlgorithm::RsaSha1) => key
                .verify(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(message), signature)
                .is_ok(),
            (Self::EcP256(key), SignatureAlgorithm::EcdsaSha256) => {
                // XML-DSig carries the raw r || s concatenation
                let parsed = p256::ecdsa::Signature::from_slice(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_der(signature));
                parsed.is_ok_and(|sig| key.verify(message, &sig).is_ok())
            }
            _ => false,
        }
    }
}

struct SignedReference<'a> {
    uri: &'a str,
    canonicalizer: ExclusiveCanonicalizer,
    digest_algorithm: DigestAlgorithm,
    digest_value: Vec<u8>,
}

/// Verify the enveloped signature of `assertion` against trusted `keys`
///
/// # Errors
///
/// - [`CryptoFailure::MissingSignature`] if the assertion is unsigned
/// - [`Error::UnsupportedAlgorithm`] for canonicalization, transform, digest
///   or signature URIs outside the supported set
/// - [`CryptoFailure::InvalidSignature`] if the reference does not name the
///   assertion, the digest does not match or no key verifies the signature
/// - [`CryptoFailure::NoMatchingKey`] if no key supports the signature algorithm
/// - [`Error::MalformedInput`] for structurally invalid signatures or duplicate IDs
pub fn verify_enveloped(
    document: &Document<'_>,
    assertion: Node<'_, '_>,
    keys: &[SamlVerificationKey],
) -> Result<SignatureAlgorithm> {
    reject_duplicate_ids(document)?;

    let assertion_id = assertion
        .attribute("ID")
        .filter(|id| !id.is_empty())
        .ok_or(Error::MalformedAssertion(AssertionElement::AssertionId))?;

    let mut signatures = element_children(assertion, "Signature");
    let signature = signatures
        .next()
        .ok_or(Error::Crypto(CryptoFailure::MissingSignature))?;
    if signatures.next().is_some() {
        return Err(Error::malformed("assertion carries more than one Signature"));
    }

    let signed_info = required_child(signature, "SignedInfo")?;
    let signature_value = decode_base64(required_child(signature, "SignatureValue")?)?;

    let c14n_method = required_child(signed_info, "CanonicalizationMethod")?;
    let c14n_uri = algorithm_attribute(c14n_method)?;
    let signed_info_c14n = ExclusiveCanonicalizer::for_algorithm(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(c14n_uri.to_string()))?;
    let signed_info_c14n = match inclusive_prefixes(c14n_method) {
        Some(list) => signed_info_c14n.with_inclusive_prefixes(list),
        None => signed_info_c14n,
    };

    let signature_uri = algorithm_attribute(required_child(signed_info, "SignatureMethod")?)?;
    let algorithm = SignatureAlgorithm::from_uri(signature_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(signature_uri.to_string()))?;

    let mut references = element_children(signed_info, "Reference");
    let reference_node = references
        .next()
        .ok_or_else(|| Error::malformed("SignedInfo has no Reference"))?;
    if references.next().is_some() {
        return Err(Error::malformed("SignedInfo must contain exactly one Reference"));
    }
    let reference = parse_reference(reference_node, signature)?;

    if reference.uri.strip_prefix('#') != Some(assertion_id) {
        warn!(reference = %reference.uri, "Signature reference does not cover the assertion");
        return Err(CryptoFailure::InvalidSignature.into());
    }

    let digest = reference
        .digest_algorithm
        .digest(reference.canonicalizer.canonicalize(assertion).as_bytes());
    if !bool::from(digest.as_slice().ct_eq(reference.digest_value.as_slice())) {
        warn!(assertion_id, "Assertion digest mismatch");
        return Err(CryptoFailure::InvalidSignature.into());
    }

    let candidates: Vec<&SamlVerificationKey> =
        keys.iter().filter(|key| key.supports(algorithm)).collect();
    if candidates.is_empty() {
        warn!(algorithm = algorithm.uri(), "No configured key supports the signature algorithm");
        return Err(CryptoFailure::NoMatchingKey.into());
    }

    let message = signed_info_c14n.canonicalize(signed_info);
    if candidates
        .iter()
        .any(|key| key.verify(algorithm, message.as_bytes(), &signature_value))
    {
        debug!(assertion_id, algorithm = algorithm.uri(), "Assertion signature verified");
        Ok(algorithm)
    } else {
        warn!(assertion_id, "Assertion signature rejected");
        Err(CryptoFailure::InvalidSignature.into())
    }
}

fn parse_reference<'a>(reference: Node<'a, '_>, signature: Node<'_, '_>) -> Result<SignedReference<'a>> {
    let uri = reference
        .attribute("URI")
        .ok_or_else(|| Error::malformed("Reference has no URI"))?;

    let mut canonicalizer = None;
    let mut enveloped = false;
    if let Some(transforms) = element_children(reference, "Transforms").next() {
        for transform in element_children(transforms, "Transform") {
            let transform_uri = algorithm_attribute(transform)?;
            match transform_uri {
                ENVELOPED_SIGNATURE => enveloped = true,
                EXCLUSIVE_C14N | EXCLUSIVE_C14N_WITH_COMMENTS => {
                    let mut c14n = ExclusiveCanonicalizer::for_algorithm(transform_uri)
                        .ok_or_else(|| Error::UnsupportedAlgorithm(transform_uri.to_string()))?;
                    if let Some(list) = inclusive_prefixes(transform) {
                        c14n = c14n.with_inclusive_prefixes(list);
                    }
                    canonicalizer = Some(c14n);
                }
                other => return Err(Error::UnsupportedAlgorithm(other.to_string())),
            }
        }
    }
    // Without an explicit transform the reference falls back to inclusive C14N 1.0
    let mut canonicalizer = canonicalizer
        .ok_or_else(|| Error::UnsupportedAlgorithm("reference without exclusive canonicalization".into()))?;
    if enveloped {
        canonicalizer = canonicalizer.excluding(signature.id());
    }

    let digest_uri = algorithm_attribute(required_child(reference, "DigestMethod")?)?;
    let digest_algorithm = DigestAlgorithm::from_uri(digest_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(digest_uri.to_string()))?;
    let digest_value = decode_base64(required_child(reference, "DigestValue")?)?;

    Ok(SignedReference {
        uri,
        canonicalizer,
        digest_algorithm,
        digest_value,
    })
}

/// Signature wrapping relies on a second element sharing the signed ID
fn reject_duplicate_ids(document: &Document<'_>) -> Result<()> {
    let mut seen = HashSet::new();
    for node in document.descendants().filter(Node::is_element) {
        for attr in node.attributes() {
            let is_id = match attr.namespace() {
                None => matches!(attr.name(), "ID" | "Id" | "id" | "AssertionID"),
                Some(ns) => ns == XML_NAMESPACE && attr.name() == "id",
            };
            if is_id && !seen.insert(attr.value()) {
                warn!(id = attr.value(), "Duplicate ID attribute in assertion document");
                return Err(Error::malformed("duplicate ID attribute"));
            }
        }
    }
    Ok(())
}

fn element_children<'a, 'input>(
    parent: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    parent
        .children()
        .filter(move |child| child.is_element() && child.has_tag_name((XMLDSIG_NAMESPACE, name)))
}

fn required_child<'a, 'input>(parent: Node<'a, 'input>, name: &'static str) -> Result<Node<'a, 'input>> {
    element_children(parent, name)
        .next()
        .ok_or_else(|| Error::malformed(format!("missing {name} element")))
}

fn algorithm_attribute<'a>(node: Node<'a, '_>) -> Result<&'a str> {
    node.attribute("Algorithm")
        .ok_or_else(|| Error::malformed(format!("{} has no Algorithm", node.tag_name().name())))
}

fn inclusive_prefixes<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.children()
        .find(|child| child.has_tag_name((EXCLUSIVE_C14N, INCLUSIVE_NAMESPACES)))
        .and_then(|child| child.attribute("PrefixList"))
}

/// Base64 element content, ignoring the line breaks signers insert
fn decode_base64(node: Node<'_, '_>) -> Result<Vec<u8>> {
    let text: String = node
        .text()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(text)
        .map_err(|e| Error::malformed(format!("invalid base64 in {}: {e}", node.tag_name().name())))
}
