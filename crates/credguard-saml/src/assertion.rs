//! SAML 2.0 assertion model
//!
//! Parsing only extracts what the verifier and its callers need. It does not
//! authenticate anything: use [`crate::Saml2AssertionVerifier`] to accept an
//! assertion.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node, ParsingOptions};

use credguard_core::{AssertionElement, Audience, ClaimViolation, Error, Issuer, JwtId, Result};

/// `urn:oasis:names:tc:SAML:2.0:assertion`
pub const SAML2_ASSERTION_NAMESPACE: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// Bearer subject confirmation method
pub const BEARER_CONFIRMATION_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// Largest accepted assertion document (256 KiB)
pub const MAX_ASSERTION_BYTES: usize = 256 * 1024;

const MAX_XML_NODES: u32 = 10_000;

/// Subject `NameID`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    pub value: String,
    pub format: Option<String>,
}

/// Bearer `SubjectConfirmationData`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectConfirmationData {
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub recipient: Option<String>,
    pub in_response_to: Option<String>,
    pub address: Option<String>,
}

/// `AuthnStatement`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    pub authn_instant: DateTime<Utc>,
    pub session_index: Option<String>,
    pub class_ref: Option<String>,
}

/// Parsed (unverified) SAML 2.0 assertion
#[derive(Debug, Clone)]
pub struct Saml2Assertion {
    id: JwtId,
    issue_instant: DateTime<Utc>,
    issuer: Issuer,
    subject: NameId,
    confirmation: SubjectConfirmationData,
    audiences: Vec<Audience>,
    not_before: Option<DateTime<Utc>>,
    expiration: Option<DateTime<Utc>>,
    authn_statement: Option<AuthnStatement>,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Saml2Assertion {
    /// Parse an assertion document whose root element is `saml:Assertion`
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedInput`] for oversized input, invalid XML, DTDs, a
    ///   root other than `Assertion` or unparseable timestamps
    /// - [`Error::MalformedAssertion`] naming the first missing required element
    /// - [`ClaimViolation::NoBearerConfirmation`] if no subject confirmation
    ///   uses the bearer method
    pub fn parse(xml: &str) -> Result<Self> {
        let document = parse_document(xml)?;
        Self::from_element(assertion_root(&document)?)
    }

    pub(crate) fn from_element(assertion: Node<'_, '_>) -> Result<Self> {
        let id = assertion
            .attribute("ID")
            .and_then(|id| JwtId::new(id).ok())
            .ok_or(Error::MalformedAssertion(AssertionElement::AssertionId))?;
        let issue_instant = parse_instant(
            assertion
                .attribute("IssueInstant")
                .ok_or(Error::MalformedAssertion(AssertionElement::IssueInstant))?,
        )?;

        let issuer = child(assertion, "Issuer")
            .and_then(|node| Issuer::new(text(node)).ok())
            .ok_or(Error::MalformedAssertion(AssertionElement::Issuer))?;

        let subject_node =
            child(assertion, "Subject").ok_or(Error::MalformedAssertion(AssertionElement::Subject))?;
        let subject = child(subject_node, "NameID")
            .filter(|node| !text(*node).is_empty())
            .map(|node| NameId {
                value: text(node),
                format: node.attribute("Format").map(str::to_string),
            })
            .ok_or(Error::MalformedAssertion(AssertionElement::Subject))?;

        let confirmations: Vec<Node<'_, '_>> = children(subject_node, "SubjectConfirmation").collect();
        if confirmations.is_empty() {
            return Err(Error::MalformedAssertion(AssertionElement::SubjectConfirmation));
        }
        let bearer = confirmations
            .into_iter()
            .find(|node| node.attribute("Method") == Some(BEARER_CONFIRMATION_METHOD))
            .ok_or(Error::Claim(ClaimViolation::NoBearerConfirmation))?;
        let confirmation = match child(bearer, "SubjectConfirmationData") {
            Some(data) => SubjectConfirmationData {
                not_before: optional_instant(data, "NotBefore")?,
                not_on_or_after: optional_instant(data, "NotOnOrAfter")?,
                recipient: data.attribute("Recipient").map(str::to_string),
                in_response_to: data.attribute("InResponseTo").map(str::to_string),
                address: data.attribute("Address").map(str::to_string),
            },
            None => SubjectConfirmationData::default(),
        };

        let conditions = child(assertion, "Conditions")
            .ok_or(Error::MalformedAssertion(AssertionElement::Conditions))?;

        let mut audiences: Vec<Audience> = Vec::new();
        let restricted = children(conditions, "AudienceRestriction")
            .flat_map(|restriction| children(restriction, "Audience"))
            .map(text);
        for value in restricted.chain(confirmation.recipient.iter().cloned()) {
            if let Ok(audience) = Audience::new(value)
                && !audiences.contains(&audience)
            {
                audiences.push(audience);
            }
        }

        let not_before = match optional_instant(conditions, "NotBefore")? {
            Some(instant) => Some(instant),
            None => confirmation.not_before,
        };
        let expiration = match optional_instant(conditions, "NotOnOrAfter")? {
            Some(instant) => Some(instant),
            None => confirmation.not_on_or_after,
        };

        let authn_statement = match child(assertion, "AuthnStatement") {
            Some(statement) => Some(AuthnStatement {
                authn_instant: parse_instant(
                    statement
                        .attribute("AuthnInstant")
                        .ok_or_else(|| Error::malformed("AuthnStatement has no AuthnInstant"))?,
                )?,
                session_index: statement.attribute("SessionIndex").map(str::to_string),
                class_ref: child(statement, "AuthnContext")
                    .and_then(|context| child(context, "AuthnContextClassRef"))
                    .map(text),
            }),
            None => None,
        };

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attribute in children(assertion, "AttributeStatement")
            .flat_map(|statement| children(statement, "Attribute"))
        {
            let Some(name) = attribute.attribute("Name") else {
                return Err(Error::malformed("Attribute has no Name"));
            };
            attributes
                .entry(name.to_string())
                .or_default()
                .extend(children(attribute, "AttributeValue").map(text));
        }

        Ok(Self {
            id,
            issue_instant,
            issuer,
            subject,
            confirmation,
            audiences,
            not_before,
            expiration,
            authn_statement,
            attributes,
        })
    }

    /// Assertion `ID`
    pub fn id(&self) -> &JwtId {
        &self.id
    }

    pub fn issue_instant(&self) -> DateTime<Utc> {
        self.issue_instant
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// Subject `NameID`
    pub fn subject(&self) -> &NameId {
        &self.subject
    }

    /// Data of the bearer subject confirmation
    pub fn subject_confirmation(&self) -> &SubjectConfirmationData {
        &self.confirmation
    }

    /// `AudienceRestriction` audiences followed by the bearer `Recipient`
    pub fn audiences(&self) -> &[Audience] {
        &self.audiences
    }

    /// `Conditions@NotBefore`, else the bearer confirmation's `NotBefore`
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// `Conditions@NotOnOrAfter`, else the bearer confirmation's `NotOnOrAfter`
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn authn_statement(&self) -> Option<&AuthnStatement> {
        self.authn_statement.as_ref()
    }

    /// Attribute values by attribute `Name`
    pub fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }

    /// Values of a single attribute
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }
}

/// Parse with DTDs disabled and a node budget
pub(crate) fn parse_document(xml: &str) -> Result<Document<'_>> {
    if xml.len() > MAX_ASSERTION_BYTES {
        return Err(Error::malformed(format!(
            "assertion exceeds {MAX_ASSERTION_BYTES} bytes"
        )));
    }
    let options = ParsingOptions {
        allow_dtd: false,
        nodes_limit: MAX_XML_NODES,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options)
        .map_err(|e| Error::malformed(format!("invalid XML: {e}")))
}

pub(crate) fn assertion_root<'a, 'input>(document: &'a Document<'input>) -> Result<Node<'a, 'input>> {
    let root = document.root_element();
    if root.has_tag_name((SAML2_ASSERTION_NAMESPACE, "Assertion")) {
        Ok(root)
    } else {
        Err(Error::malformed(format!(
            "expected a SAML 2.0 Assertion, found {}",
            root.tag_name().name()
        )))
    }
}

fn children<'a, 'input>(
    parent: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    parent.children().filter(move |node| {
        node.is_element() && node.has_tag_name((SAML2_ASSERTION_NAMESPACE, name))
    })
}

fn child<'a, 'input>(parent: Node<'a, 'input>, name: &'static str) -> Option<Node<'a, 'input>> {
    children(parent, name).next()
}

/// Character data of `node` with interleaved comments skipped, trimmed
fn text(node: Node<'_, '_>) -> String {
    let joined: String = node
        .children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect();
    joined.trim().to_string()
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| Error::malformed(format!("invalid xs:dateTime {value:?}: {e}")))
}

fn optional_instant(node: Node<'_, '_>, attribute: &str) -> Result<Option<DateTime<Utc>>> {
    node.attribute(attribute).map(parse_instant).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assertion(conditions: &str, confirmation: &str) -> String {
        format!(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" IssueInstant="2024-06-01T12:00:00Z" Version="2.0">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">alice</saml:NameID>
    {confirmation}
  </saml:Subject>
  {conditions}
</saml:Assertion>"#
        )
    }

    const BEARER: &str = r#"<saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData NotBefore="2024-06-01T11:58:00Z" NotOnOrAfter="2024-06-01T12:05:00Z" Recipient="https://c2id.com/token" InResponseTo="_req"/>
    </saml:SubjectConfirmation>"#;

    #[test]
    fn test_times_fall_back_to_confirmation_data() {
        let parsed = Saml2Assertion::parse(&assertion("<saml:Conditions/>", BEARER)).unwrap();
        assert_eq!(parsed.id(), "_1");
        assert_eq!(parsed.issuer(), "https://idp.example.com");
        assert_eq!(parsed.subject().value, "alice");
        assert_eq!(
            parsed.subject().format.as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:nameid-format:persistent")
        );
        assert_eq!(
            parsed.expiration(),
            Some(parse_instant("2024-06-01T12:05:00Z").unwrap())
        );
        assert_eq!(
            parsed.not_before(),
            Some(parse_instant("2024-06-01T11:58:00Z").unwrap())
        );
        assert_eq!(
            parsed.subject_confirmation().in_response_to.as_deref(),
            Some("_req")
        );
        assert_eq!(parsed.audiences(), &[Audience::new("https://c2id.com/token").unwrap()]);
        assert!(parsed.authn_statement().is_none());
        assert!(parsed.attributes().is_empty());
    }

    #[test]
    fn test_conditions_take_precedence() {
        let conditions = r#"<saml:Conditions NotBefore="2024-06-01T11:00:00Z" NotOnOrAfter="2024-06-01T13:00:00Z">
    <saml:AudienceRestriction><saml:Audience>https://c2id.com</saml:Audience></saml:AudienceRestriction>
    <saml:AudienceRestriction><saml:Audience>https://c2id.com/token</saml:Audience></saml:AudienceRestriction>
  </saml:Conditions>"#;
        let parsed = Saml2Assertion::parse(&assertion(conditions, BEARER)).unwrap();
        assert_eq!(
            parsed.expiration(),
            Some(parse_instant("2024-06-01T13:00:00Z").unwrap())
        );
        assert_eq!(
            parsed.not_before(),
            Some(parse_instant("2024-06-01T11:00:00Z").unwrap())
        );
        // Recipient duplicates the second restriction
        assert_eq!(
            parsed.audiences(),
            &[
                Audience::new("https://c2id.com").unwrap(),
                Audience::new("https://c2id.com/token").unwrap()
            ]
        );
    }

    #[test]
    fn test_missing_required_elements() {
        let cases = [
            (
                assertion("<saml:Conditions/>", BEARER).replace(r#" ID="_1""#, ""),
                AssertionElement::AssertionId,
            ),
            (
                assertion("<saml:Conditions/>", BEARER)
                    .replace(r#" IssueInstant="2024-06-01T12:00:00Z""#, ""),
                AssertionElement::IssueInstant,
            ),
            (
                assertion("<saml:Conditions/>", BEARER)
                    .replace("<saml:Issuer>https://idp.example.com</saml:Issuer>", ""),
                AssertionElement::Issuer,
            ),
            (assertion("", BEARER), AssertionElement::Conditions),
            (
                assertion("<saml:Conditions/>", ""),
                AssertionElement::SubjectConfirmation,
            ),
        ];
        for (xml, element) in cases {
            assert_eq!(
                Saml2Assertion::parse(&xml).unwrap_err(),
                Error::MalformedAssertion(element)
            );
        }

        let no_subject = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" IssueInstant="2024-06-01T12:00:00Z">
  <saml:Issuer>https://idp.example.com</saml:Issuer><saml:Conditions/></saml:Assertion>"#;
        assert_eq!(
            Saml2Assertion::parse(no_subject).unwrap_err(),
            Error::MalformedAssertion(AssertionElement::Subject)
        );
    }

    #[test]
    fn test_holder_of_key_only_is_not_bearer() {
        let hok = r#"<saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:holder-of-key"/>"#;
        assert_eq!(
            Saml2Assertion::parse(&assertion("<saml:Conditions/>", hok)).unwrap_err(),
            Error::Claim(ClaimViolation::NoBearerConfirmation)
        );
    }

    #[test]
    fn test_comment_does_not_truncate_name_id() {
        let xml = assertion("<saml:Conditions/>", BEARER)
            .replace(">alice<", ">alice@example.com<!---->.evil.example<");
        let parsed = Saml2Assertion::parse(&xml).unwrap();
        assert_eq!(parsed.subject().value, "alice@example.com.evil.example");
    }

    #[test]
    fn test_attributes_are_merged_by_name() {
        let statements = r#"<saml:Conditions/>
  <saml:AttributeStatement>
    <saml:Attribute Name="groups"><saml:AttributeValue>admins</saml:AttributeValue></saml:Attribute>
  </saml:AttributeStatement>
  <saml:AttributeStatement>
    <saml:Attribute Name="groups"><saml:AttributeValue> staff </saml:AttributeValue></saml:Attribute>
    <saml:Attribute Name="mail"><saml:AttributeValue>alice@example.com</saml:AttributeValue></saml:Attribute>
  </saml:AttributeStatement>"#;
        let parsed = Saml2Assertion::parse(&assertion(statements, BEARER)).unwrap();
        assert_eq!(
            parsed.attribute("groups").unwrap(),
            &["admins".to_string(), "staff".to_string()]
        );
        assert_eq!(parsed.attributes().len(), 2);
        assert!(parsed.attribute("missing").is_none());
    }

    #[test]
    fn test_dtd_is_rejected() {
        let xml = format!(
            "<!DOCTYPE x [<!ENTITY e \"boom\">]>{}",
            assertion("<saml:Conditions/>", BEARER)
        );
        assert!(matches!(
            Saml2Assertion::parse(&xml),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_wrong_root_and_bad_timestamps() {
        assert!(matches!(
            Saml2Assertion::parse(r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol"/>"#),
            Err(Error::MalformedInput(_))
        ));
        let xml = assertion("<saml:Conditions/>", BEARER).replace("2024-06-01T12:00:00Z", "yesterday");
        assert!(matches!(
            Saml2Assertion::parse(&xml),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_fractional_seconds_and_offsets() {
        assert_eq!(
            parse_instant("2024-06-01T12:00:00.123Z").unwrap().timestamp_subsec_millis(),
            123
        );
        assert_eq!(
            parse_instant("2024-06-01T14:00:00+02:00").unwrap(),
            parse_instant("2024-06-01T12:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_oversized_input() {
        let xml = " ".repeat(MAX_ASSERTION_BYTES + 1);
        assert!(matches!(
            Saml2Assertion::parse(&xml),
            Err(Error::MalformedInput(_))
        ));
    }
}
