//! Shared fixtures for credguard integration tests
//!
//! Key material is generated once per test binary; RSA generation dominates
//! test time otherwise.

#![allow(dead_code)]

use std::sync::OnceLock;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::LineEnding;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use sha2::Sha256;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use credguard::jose::EncryptionMethod;

pub const ISSUER: &str = "https://c2id.com";
pub const CLIENT_ID: &str = "123";
pub const TOKEN_ENDPOINT: &str = "https://c2id.com/token";
pub const NONCE: &str = "n-0S6_WzA2Mj";
pub const SHARED_SECRET: &str = "a-shared-secret-of-at-least-32-bytes!";

pub fn b64(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Install a tracing subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// RSA signing / decryption key
pub struct TestRsaKey {
    pub private: RsaPrivateKey,
    pub private_pem: String,
    pub kid: String,
}

impl TestRsaKey {
    fn generate(kid: &str) -> Self {
        let private =
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("Failed to generate RSA key");
        let private_pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .expect("Failed to encode RSA key")
            .to_string();
        Self {
            private,
            private_pem,
            kid: kid.to_string(),
        }
    }

    pub fn public(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// Public JWK with `use: sig`
    pub fn jwk(&self, alg: &str) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": alg,
            "n": b64(&self.private.n().to_bytes_be()),
            "e": b64(&self.private.e().to_bytes_be()),
        })
    }

    pub fn sign(&self, alg: Algorithm, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).expect("Invalid RSA key");
        encode(&header, claims, &key).expect("Failed to sign test JWT")
    }
}

/// P-256 signing key
pub struct TestEcKey {
    pub private_pem: String,
    pub x: String,
    pub y: String,
    pub kid: String,
}

impl TestEcKey {
    fn generate(kid: &str) -> Self {
        let secret = p256::SecretKey::random(&mut rand::thread_rng());
        let point = secret.public_key().to_encoded_point(false);
        Self {
            private_pem: secret
                .to_pkcs8_pem(p256::pkcs8::LineEnding::LF)
                .expect("Failed to encode EC key")
                .to_string(),
            x: b64(point.x().expect("uncompressed point")),
            y: b64(point.y().expect("uncompressed point")),
            kid: kid.to_string(),
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "EC",
            "crv": "P-256",
            "kid": self.kid,
            "use": "sig",
            "alg": "ES256",
            "x": self.x,
            "y": self.y,
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_ec_pem(self.private_pem.as_bytes()).expect("Invalid EC key");
        encode(&header, claims, &key).expect("Failed to sign test JWT")
    }
}

pub fn rsa_key() -> &'static TestRsaKey {
    static KEY: OnceLock<TestRsaKey> = OnceLock::new();
    KEY.get_or_init(|| TestRsaKey::generate("rsa-2025-01"))
}

pub fn rotated_rsa_key() -> &'static TestRsaKey {
    static KEY: OnceLock<TestRsaKey> = OnceLock::new();
    KEY.get_or_init(|| TestRsaKey::generate("rsa-2025-07"))
}

pub fn ec_key() -> &'static TestEcKey {
    static KEY: OnceLock<TestEcKey> = OnceLock::new();
    KEY.get_or_init(|| TestEcKey::generate("ec-2025-01"))
}

pub fn hs256(claims: &Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign test JWT")
}

pub fn unsecured(claims: &Value) -> String {
    format!("{}.{}.", b64(br#"{"alg":"none"}"#), b64(claims.to_string().as_bytes()))
}

/// Standard ID token claims valid at `now`
pub fn id_token_claims(now: i64) -> Value {
    json!({
        "iss": ISSUER,
        "sub": "alice",
        "aud": CLIENT_ID,
        "exp": now + 300,
        "iat": now,
        "nonce": NONCE,
        "auth_time": now - 30,
    })
}

/// Client assertion claims valid at `now`
pub fn assertion_claims(client_id: &str, audience: &str, now: i64) -> Value {
    json!({
        "iss": client_id,
        "sub": client_id,
        "aud": [audience],
        "exp": now + 300,
        "iat": now,
        "jti": uuid::Uuid::new_v4().to_string(),
    })
}

/// Build a compact JWE around `plaintext`
pub fn seal_jwe(
    header: &Value,
    cek: &[u8],
    encrypted_key: &[u8],
    plaintext: &[u8],
    enc: EncryptionMethod,
) -> String {
    let protected = b64(header.to_string().as_bytes());
    let aad = protected.as_bytes();
    let (iv, ciphertext, tag) = match enc {
        EncryptionMethod::A128Gcm | EncryptionMethod::A256Gcm => {
            let iv = [3u8; 12];
            let payload = Payload { msg: plaintext, aad };
            let sealed = if enc == EncryptionMethod::A128Gcm {
                Aes128Gcm::new_from_slice(cek)
                    .unwrap()
                    .encrypt(Nonce::from_slice(&iv), payload)
            } else {
                Aes256Gcm::new_from_slice(cek)
                    .unwrap()
                    .encrypt(Nonce::from_slice(&iv), payload)
            }
            .unwrap();
            let (ct, tag) = sealed.split_at(sealed.len() - 16);
            (iv.to_vec(), ct.to_vec(), tag.to_vec())
        }
        EncryptionMethod::A128CbcHs256 => {
            let iv = [5u8; 16];
            let (mac_key, enc_key) = cek.split_at(16);
            let ct = cbc::Encryptor::<aes::Aes128>::new_from_slices(enc_key, &iv)
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
        EncryptionMethod::A256CbcHs512 => panic!("A256CBC-HS512 sealing not needed by tests"),
    };
    format!(
        "{protected}.{}.{}.{}.{}",
        b64(encrypted_key),
        b64(&iv),
        b64(&ciphertext),
        b64(&tag)
    )
}

/// Wrap a content encryption key with RSA-OAEP-256
pub fn rsa_oaep_256_wrap(public: &RsaPublicKey, cek: &[u8]) -> Vec<u8> {
    public
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), cek)
        .expect("Failed to wrap CEK")
}

/// Mock issuer serving a JWK set
pub struct MockIssuer {
    pub server: MockServer,
}

impl MockIssuer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn jwks_url(&self) -> Url {
        Url::parse(&format!("{}/jwks.json", self.server.uri())).unwrap()
    }

    /// Serve `keys` on every request
    pub async fn mock_jwks(&self, keys: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for the next `times` requests only
    pub async fn mock_jwks_times(&self, keys: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_response(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}
