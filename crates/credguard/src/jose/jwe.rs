//! JWE compact decryption (RFC 7516)
//!
//! Key management: `RSA-OAEP`, `RSA-OAEP-256`, `dir`.
//! Content encryption: `A128GCM`, `A256GCM`, `A128CBC-HS256`, `A256CBC-HS512`.
//!
//! Every failure, whatever step it happens in, surfaces as
//! [`CryptoFailure::DecryptionFailed`] so callers cannot distinguish a bad key
//! from a bad tag.

use aes::{Aes128, Aes256};
use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use tracing::debug;

use credguard_core::{CryptoFailure, Error, Result};

use super::token::EncryptedJwt;
use super::{EncryptionMethod, JweAlgorithm};

const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const CBC_IV_LEN: usize = 16;

/// A candidate decryption key
#[derive(Clone)]
pub enum JweDecryptionKey {
    /// RSA private key for `RSA-OAEP` / `RSA-OAEP-256`
    Rsa {
        key: RsaPrivateKey,
        key_id: Option<String>,
    },
    /// Shared content encryption key for `dir`
    Direct {
        key: Vec<u8>,
        key_id: Option<String>,
    },
}

impl JweDecryptionKey {
    /// Parse an RSA private key from PKCS#8 or PKCS#1 PEM
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the PEM holds no RSA private key.
    pub fn rsa_from_pem(pem: &str, key_id: Option<String>) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::Configuration(format!("invalid RSA private key: {e}")))?;
        Ok(JweDecryptionKey::Rsa { key, key_id })
    }

    /// Wrap a shared symmetric key for `dir`
    pub fn direct(key: impl Into<Vec<u8>>, key_id: Option<String>) -> Self {
        JweDecryptionKey::Direct {
            key: key.into(),
            key_id,
        }
    }

    /// Key identifier, if any
    pub fn key_id(&self) -> Option<&str> {
        match self {
            JweDecryptionKey::Rsa { key_id, .. } | JweDecryptionKey::Direct { key_id, .. } => {
                key_id.as_deref()
            }
        }
    }

    /// Whether this key can serve the given key management algorithm
    pub fn supports(&self, algorithm: JweAlgorithm) -> bool {
        matches!(
            (self, algorithm),
            (
                JweDecryptionKey::Rsa { .. },
                JweAlgorithm::RsaOaep | JweAlgorithm::RsaOaep256
            ) | (JweDecryptionKey::Direct { .. }, JweAlgorithm::Dir)
        )
    }
}

impl std::fmt::Debug for JweDecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            JweDecryptionKey::Rsa { .. } => "rsa",
            JweDecryptionKey::Direct { .. } => "direct",
        };
        f.debug_struct("JweDecryptionKey")
            .field("kind", &kind)
            .field("key_id", &self.key_id())
            .finish()
    }
}

/// Decrypt a JWE with one candidate key
///
/// # Errors
///
/// Returns [`CryptoFailure::DecryptionFailed`] on any failure.
pub fn decrypt(jwe: &EncryptedJwt, key: &JweDecryptionKey) -> Result<Vec<u8>> {
    decrypt_inner(jwe, key).ok_or_else(|| {
        debug!(
            alg = %jwe.algorithm,
            enc = %jwe.encryption,
            key_id = ?key.key_id(),
            "JWE did not decrypt with candidate key"
        );
        Error::Crypto(CryptoFailure::DecryptionFailed)
    })
}

fn decrypt_inner(jwe: &EncryptedJwt, key: &JweDecryptionKey) -> Option<Vec<u8>> {
    let cek = unwrap_cek(jwe, key)?;
    if cek.len() != jwe.encryption.key_len() {
        return None;
    }

    let aad = jwe.protected.as_bytes();
    match jwe.encryption {
        EncryptionMethod::A128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(&cek).ok()?;
            gcm_decrypt(&cipher, jwe, aad)
        }
        EncryptionMethod::A256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(&cek).ok()?;
            gcm_decrypt(&cipher, jwe, aad)
        }
        EncryptionMethod::A128CbcHs256 => {
            let (mac_key, enc_key) = cek.split_at(16);
            if !cbc_hmac_tag_valid::<Hmac<Sha256>>(mac_key, jwe, aad, 16) {
                return None;
            }
            cbc::Decryptor::<Aes128>::new_from_slices(enc_key, &jwe.iv)
                .ok()
                .and_then(|decryptor| cbc_decrypt(decryptor, &jwe.ciphertext))
        }
        EncryptionMethod::A256CbcHs512 => {
            let (mac_key, enc_key) = cek.split_at(32);
            if !cbc_hmac_tag_valid::<Hmac<Sha512>>(mac_key, jwe, aad, 32) {
                return None;
            }
            cbc::Decryptor::<Aes256>::new_from_slices(enc_key, &jwe.iv)
                .ok()
                .and_then(|decryptor| cbc_decrypt(decryptor, &jwe.ciphertext))
        }
    }
}

fn unwrap_cek(jwe: &EncryptedJwt, key: &JweDecryptionKey) -> Option<Vec<u8>> {
    match (jwe.algorithm, key) {
        (JweAlgorithm::RsaOaep, JweDecryptionKey::Rsa { key, .. }) => key
            .decrypt(Oaep::new::<sha1::Sha1>(), &jwe.encrypted_key)
            .ok(),
        (JweAlgorithm::RsaOaep256, JweDecryptionKey::Rsa { key, .. }) => {
            key.decrypt(Oaep::new::<Sha256>(), &jwe.encrypted_key).ok()
        }
        (JweAlgorithm::Dir, JweDecryptionKey::Direct { key, .. }) => {
            // dir carries no encrypted key
            jwe.encrypted_key.is_empty().then(|| key.clone())
        }
        _ => None,
    }
}

fn gcm_decrypt<C: Aead>(cipher: &C, jwe: &EncryptedJwt, aad: &[u8]) -> Option<Vec<u8>> {
    if jwe.iv.len() != GCM_IV_LEN || jwe.tag.len() != GCM_TAG_LEN {
        return None;
    }
    let mut sealed = Vec::with_capacity(jwe.ciphertext.len() + GCM_TAG_LEN);
    sealed.extend_from_slice(&jwe.ciphertext);
    sealed.extend_from_slice(&jwe.tag);
    cipher
        .decrypt(
            Nonce::<C>::from_slice(&jwe.iv),
            Payload {
                msg: &sealed,
                aad,
            },
        )
        .ok()
}

/// Authentication tag check for AES_CBC_HMAC_SHA2 (RFC 7518 §5.2.2.2)
fn cbc_hmac_tag_valid<M: Mac + KeyInit>(
    mac_key: &[u8],
    jwe: &EncryptedJwt,
    aad: &[u8],
    tag_len: usize,
) -> bool {
    if jwe.iv.len() != CBC_IV_LEN || jwe.tag.len() != tag_len {
        return false;
    }
    let Ok(mut mac) = <M as Mac>::new_from_slice(mac_key) else {
        return false;
    };
    let aad_bits = (aad.len() as u64).saturating_mul(8);
    mac.update(aad);
    mac.update(&jwe.iv);
    mac.update(&jwe.ciphertext);
    mac.update(&aad_bits.to_be_bytes());
    let full = mac.finalize().into_bytes();
    bool::from(full[..tag_len].ct_eq(&jwe.tag))
}

fn cbc_decrypt<D: BlockDecryptMut>(decryptor: D, ciphertext: &[u8]) -> Option<Vec<u8>> {
    let mut buffer = ciphertext.to_vec();
    decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .ok()
        .map(<[u8]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::TokenRepresentation;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use aes_gcm::Nonce as GcmNonce;
    use cbc::cipher::BlockEncryptMut;
    use rsa::RsaPublicKey;

    fn b64(data: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(data)
    }

    fn seal(header: &str, cek: &[u8], encrypted_key: &[u8], plaintext: &[u8], enc: EncryptionMethod) -> String {
        let protected = b64(header.as_bytes());
        let aad = protected.as_bytes();
        let (iv, ciphertext, tag) = match enc {
            EncryptionMethod::A128Gcm | EncryptionMethod::A256Gcm => {
                let iv = [7u8; GCM_IV_LEN];
                let sealed = if enc == EncryptionMethod::A128Gcm {
                    Aes128Gcm::new_from_slice(cek).unwrap().encrypt(
                        GcmNonce::from_slice(&iv),
                        Payload { msg: plaintext, aad },
                    )
                } else {
                    Aes256Gcm::new_from_slice(cek).unwrap().encrypt(
                        GcmNonce::from_slice(&iv),
                        Payload { msg: plaintext, aad },
                    )
                }
                .unwrap();
                let (ct, tag) = sealed.split_at(sealed.len() - GCM_TAG_LEN);
                (iv.to_vec(), ct.to_vec(), tag.to_vec())
            }
            EncryptionMethod::A128CbcHs256 => {
                let iv = [9u8; CBC_IV_LEN];
                let (mac_key, enc_key) = cek.split_at(16);
                let ct = cbc::Encryptor::<Aes128>::new_from_slices(enc_key, &iv)
                    .unwrap()
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(mac_key).unwrap();
                mac.update(aad);
                mac.update(&iv);
                mac.update(&ct);
                mac.update(&((aad.len() as u64) * 8).to_be_bytes());
                let tag = mac.finalize().into_bytes()[..16].to_vec();
                (iv.to_vec(), ct, tag)
            }
            EncryptionMethod::A256CbcHs512 => unreachable!("not used in these tests"),
        };
        format!(
            "{protected}.{}.{}.{}.{}",
            b64(encrypted_key),
            b64(&iv),
            b64(&ciphertext),
            b64(&tag)
        )
    }

    fn parse(token: &str) -> EncryptedJwt {
        match TokenRepresentation::parse(token).unwrap() {
            TokenRepresentation::Encrypted(jwe) => jwe,
            other => panic!("unexpected variant {}", other.kind()),
        }
    }

    #[test]
    fn test_dir_a128gcm() {
        let cek = [1u8; 16];
        let token = seal(
            r#"{"alg":"dir","enc":"A128GCM"}"#,
            &cek,
            &[],
            b"inner.jwt.here",
            EncryptionMethod::A128Gcm,
        );
        let jwe = parse(&token);
        let plaintext = decrypt(&jwe, &JweDecryptionKey::direct(cek.to_vec(), None)).unwrap();
        assert_eq!(plaintext, b"inner.jwt.here");

        let wrong = JweDecryptionKey::direct(vec![2u8; 16], None);
        assert_eq!(
            decrypt(&jwe, &wrong).unwrap_err(),
            Error::Crypto(CryptoFailure::DecryptionFailed)
        );
    }

    #[test]
    fn test_dir_cbc_hmac() {
        let cek: Vec<u8> = (0u8..32).collect();
        let token = seal(
            r#"{"alg":"dir","enc":"A128CBC-HS256"}"#,
            &cek,
            &[],
            b"payload",
            EncryptionMethod::A128CbcHs256,
        );
        let jwe = parse(&token);
        assert_eq!(
            decrypt(&jwe, &JweDecryptionKey::direct(cek.clone(), None)).unwrap(),
            b"payload"
        );

        let mut tampered = jwe.clone();
        tampered.tag[0] ^= 0x01;
        assert!(decrypt(&tampered, &JweDecryptionKey::direct(cek, None)).is_err());
    }

    #[test]
    fn test_rsa_oaep_256() {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        let cek = [5u8; 32];
        let encrypted_key = public
            .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), &cek)
            .unwrap();
        let token = seal(
            r#"{"alg":"RSA-OAEP-256","enc":"A256GCM"}"#,
            &cek,
            &encrypted_key,
            b"nested",
            EncryptionMethod::A256Gcm,
        );
        let jwe = parse(&token);
        let key = JweDecryptionKey::Rsa {
            key: private,
            key_id: Some("enc-1".into()),
        };
        assert!(key.supports(JweAlgorithm::RsaOaep256));
        assert!(!key.supports(JweAlgorithm::Dir));
        assert_eq!(decrypt(&jwe, &key).unwrap(), b"nested");

        // Key type does not fit the algorithm
        assert!(decrypt(&jwe, &JweDecryptionKey::direct(cek.to_vec(), None)).is_err());
    }

    #[test]
    fn test_dir_rejects_encrypted_key() {
        let cek = [1u8; 16];
        let token = seal(
            r#"{"alg":"dir","enc":"A128GCM"}"#,
            &cek,
            b"unexpected",
            b"x",
            EncryptionMethod::A128Gcm,
        );
        assert!(decrypt(&parse(&token), &JweDecryptionKey::direct(cek.to_vec(), None)).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", JweDecryptionKey::direct(b"top-secret".to_vec(), None));
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("direct"));
    }
}
