//! # credguard-saml
//!
//! SAML 2.0 bearer assertion verification (RFC 7522 authorization grants and
//! client authentication) with enveloped XML digital signatures.
//!
//! ## Architecture
//!
//! - `assertion` - Assertion model and DTD-free parsing
//! - `c14n` - Exclusive XML canonicalization
//! - `dsig` - Enveloped signature verification and trusted key material
//! - `verifier` - Signature-first assertion verification and configuration
//! - `grant` - `saml2-bearer` token request parsing
//!
//! ## Example
//!
//! ```no_run
//! use credguard_core::{AudienceSet, Issuer};
//! use credguard_saml::{Saml2AssertionVerifier, Saml2BearerGrant, SamlVerificationKey};
//!
//! # fn run(body: &[u8], idp_certificate: &str) -> credguard_core::Result<()> {
//! let verifier = Saml2AssertionVerifier::new(
//!     Issuer::new("https://idp.example.com")?,
//!     AudienceSet::from_strings(["https://c2id.com/token"])?,
//!     vec![SamlVerificationKey::from_x509_pem(idp_certificate)?],
//! )?;
//!
//! let grant = Saml2BearerGrant::parse(body)?;
//! let assertion = verifier.verify_grant(&grant)?;
//! println!("{} authenticated", assertion.subject().value);
//! # Ok(())
//! # }
//! ```

pub mod assertion;
pub mod c14n;
pub mod dsig;
pub mod grant;
pub mod verifier;

pub use assertion::{AuthnStatement, NameId, Saml2Assertion, SubjectConfirmationData};
pub use dsig::{DigestAlgorithm, SamlVerificationKey, SignatureAlgorithm};
pub use grant::{SAML2_BEARER_GRANT_TYPE, Saml2BearerGrant};
pub use verifier::{Saml2AssertionVerifier, Saml2VerifierConfig};
