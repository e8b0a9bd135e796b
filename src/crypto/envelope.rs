//! Hybrid envelope codec.
//!
//! # Wire Format
//! ```text
//! {
//!   "encrypted_key": base64(RSA-OAEP-SHA256(base64(aes_key))),
//!   "iv":            base64(16 random bytes),
//!   "data":          base64(AES-256-CBC-PKCS7(json))
//! }
//! ```
//!
//! A fresh key and IV are drawn for every sealed value.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

use crate::crypto::keys::{parse_public_key, ServerKeys};
use crate::session::Session;

pub const AES_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Three-field hybrid-encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub encrypted_key: String,
    pub iv: String,
    pub data: String,
}

/// Envelope as received; presence is checked explicitly.
#[derive(Deserialize)]
struct RawEnvelope {
    encrypted_key: Option<String>,
    iv: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope is missing field `{0}`")]
    MissingField(&'static str),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("field `{0}` is not valid base64")]
    Base64(&'static str),

    #[error("{what} must be {expected} bytes, got {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unable to unwrap symmetric key")]
    KeyUnwrap,

    #[error("unable to wrap symmetric key: {0}")]
    KeyWrap(String),

    #[error("session public key is unusable: {0}")]
    PublicKey(String),

    #[error("ciphertext padding is invalid")]
    Padding,

    #[error("payload is not valid JSON: {0}")]
    Json(String),
}

/// Result of [`encode`]: either a sealed envelope or the untouched value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Encoded {
    Sealed(Envelope),
    Plaintext(Value),
}

impl Encoded {
    pub fn is_sealed(&self) -> bool {
        matches!(self, Encoded::Sealed(_))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Json(e.to_string()))
    }
}

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

fn decode_field(value: &str, field: &'static str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| CodecError::Base64(field))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, CodecError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(CodecError::MissingField(field))
}

/// Clients wrap either the raw key or its base64 text.
fn symmetric_key(unwrapped: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    if unwrapped.len() == AES_KEY_LEN {
        return Ok(unwrapped);
    }
    let key = STANDARD
        .decode(&unwrapped)
        .map_err(|_| CodecError::Length {
            what: "symmetric key",
            expected: AES_KEY_LEN,
            actual: unwrapped.len(),
        })?;
    if key.len() != AES_KEY_LEN {
        return Err(CodecError::Length {
            what: "symmetric key",
            expected: AES_KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(key)
}

/// Open a request envelope with the server's private key.
pub fn decode(raw_body: &[u8], private_key: &RsaPrivateKey) -> Result<Value, CodecError> {
    let raw: RawEnvelope =
        serde_json::from_slice(raw_body).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let encrypted_key = required(raw.encrypted_key, "encrypted_key")?;
    let iv = required(raw.iv, "iv")?;
    let data = required(raw.data, "data")?;

    let wrapped_key = decode_field(&encrypted_key, "encrypted_key")?;
    let iv = decode_field(&iv, "iv")?;
    if iv.len() != IV_LEN {
        return Err(CodecError::Length {
            what: "iv",
            expected: IV_LEN,
            actual: iv.len(),
        });
    }
    let ciphertext = decode_field(&data, "data")?;

    let unwrapped = private_key
        .decrypt(oaep(), &wrapped_key)
        .map_err(|_| CodecError::KeyUnwrap)?;
    let key = symmetric_key(unwrapped)?;

    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| CodecError::Malformed("cipher initialisation failed".into()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CodecError::Padding)?;

    serde_json::from_slice(&plaintext).map_err(|e| CodecError::Json(e.to_string()))
}

/// Seal `value` for the holder of `public_key`.
pub fn seal(value: &Value, public_key: &RsaPublicKey) -> Result<Envelope, CodecError> {
    let mut rng = rand::thread_rng();
    let mut key = [0u8; AES_KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut key);
    rng.fill_bytes(&mut iv);

    let plaintext = serde_json::to_vec(value).map_err(|e| CodecError::Json(e.to_string()))?;
    let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|_| CodecError::Malformed("cipher initialisation failed".into()))?
        .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    let key_text = STANDARD.encode(key);
    let wrapped_key = public_key
        .encrypt(&mut rng, oaep(), key_text.as_bytes())
        .map_err(|e| CodecError::KeyWrap(e.to_string()))?;

    Ok(Envelope {
        encrypted_key: STANDARD.encode(wrapped_key),
        iv: STANDARD.encode(iv),
        data: STANDARD.encode(ciphertext),
    })
}

/// Seal a response for `session`, or pass it through when the session
/// holds no public key.
pub fn encode(value: Value, session: Option<&Session>) -> Result<Encoded, CodecError> {
    let Some(encoded_key) = session.and_then(|s| s.public_key.as_deref()) else {
        tracing::info!(
            has_session = session.is_some(),
            "No session public key, responding in plaintext"
        );
        return Ok(Encoded::Plaintext(value));
    };

    let public_key =
        parse_public_key(encoded_key).map_err(|e| CodecError::PublicKey(e.to_string()))?;
    seal(&value, &public_key).map(Encoded::Sealed)
}

/// Codec bound to the server key pair.
#[derive(Clone, Debug)]
pub struct EnvelopeCodec {
    keys: Arc<ServerKeys>,
}

impl EnvelopeCodec {
    pub fn new(keys: Arc<ServerKeys>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &ServerKeys {
        &self.keys
    }

    pub fn decode(&self, raw_body: &[u8]) -> Result<Value, CodecError> {
        decode(raw_body, self.keys.private_key())
    }

    pub fn encode(&self, value: Value, session: Option<&Session>) -> Result<Encoded, CodecError> {
        encode(value, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::OnceLock;

    fn keys() -> &'static ServerKeys {
        static KEYS: OnceLock<ServerKeys> = OnceLock::new();
        KEYS.get_or_init(|| ServerKeys::generate(1024).unwrap())
    }

    fn session(public_key: Option<String>) -> Session {
        let now = Utc::now();
        Session {
            token: "t".into(),
            public_key,
            expires_at: now + Duration::days(7),
            device_id: None,
            user_id: None,
            created_at: now,
            last_active_at: now,
        }
    }

    fn body(envelope: &Envelope) -> Vec<u8> {
        serde_json::to_vec(envelope).unwrap()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let payload = json!({"foo": 1, "nested": {"list": [1, 2, 3], "text": "héllo"}});
        let s = session(Some(keys().public_key_pem().to_string()));

        let Encoded::Sealed(envelope) = encode(payload.clone(), Some(&s)).unwrap() else {
            panic!("expected sealed output");
        };
        assert_eq!(STANDARD.decode(&envelope.iv).unwrap().len(), IV_LEN);

        let opened = decode(&body(&envelope), keys().private_key()).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn test_fresh_key_and_iv_per_call() {
        let value = json!({"foo": 1});
        let a = seal(&value, &keys().public_key()).unwrap();
        let b = seal(&value, &keys().public_key()).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encrypted_key, b.encrypted_key);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_accepts_raw_wrapped_key() {
        let mut key = [0u8; AES_KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(br#"{"foo":1}"#);
        let wrapped = keys()
            .public_key()
            .encrypt(&mut rand::thread_rng(), oaep(), &key)
            .unwrap();
        let envelope = Envelope {
            encrypted_key: STANDARD.encode(wrapped),
            iv: STANDARD.encode(iv),
            data: STANDARD.encode(ciphertext),
        };
        assert_eq!(decode(&body(&envelope), keys().private_key()).unwrap(), json!({"foo": 1}));
    }

    #[test]
    fn test_missing_fields() {
        let full = seal(&json!({"foo": 1}), &keys().public_key()).unwrap();
        let cases = [
            (json!({"iv": full.iv, "data": full.data}), "encrypted_key"),
            (json!({"encrypted_key": full.encrypted_key, "data": full.data}), "iv"),
            (json!({"encrypted_key": full.encrypted_key, "iv": full.iv}), "data"),
            (json!({"encrypted_key": "", "iv": full.iv, "data": full.data}), "encrypted_key"),
        ];
        for (raw, field) in cases {
            let err = decode(&serde_json::to_vec(&raw).unwrap(), keys().private_key()).unwrap_err();
            assert!(
                matches!(err, CodecError::MissingField(f) if f == field),
                "expected missing {field}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_crypto_failures() {
        let mut envelope = seal(&json!({"foo": 1}), &keys().public_key()).unwrap();

        let mut bad_b64 = envelope.clone();
        bad_b64.data = "%%%".into();
        assert!(matches!(
            decode(&body(&bad_b64), keys().private_key()),
            Err(CodecError::Base64("data"))
        ));

        let mut short_iv = envelope.clone();
        short_iv.iv = STANDARD.encode([0u8; 8]);
        assert!(matches!(
            decode(&body(&short_iv), keys().private_key()),
            Err(CodecError::Length { what: "iv", .. })
        ));

        let other = ServerKeys::generate(1024).unwrap();
        assert!(matches!(
            decode(&body(&envelope), other.private_key()),
            Err(CodecError::KeyUnwrap)
        ));

        // Flipping the last ciphertext byte corrupts the padding block.
        let mut data = STANDARD.decode(&envelope.data).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        envelope.data = STANDARD.encode(data);
        assert!(decode(&body(&envelope), keys().private_key()).is_err());

        assert!(matches!(
            decode(b"not json", keys().private_key()),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_plaintext_fallback() {
        let value = json!({"status": "ok"});
        assert_eq!(encode(value.clone(), None).unwrap(), Encoded::Plaintext(value.clone()));
        assert_eq!(
            encode(value.clone(), Some(&session(None))).unwrap(),
            Encoded::Plaintext(value)
        );
    }

    #[test]
    fn test_bad_session_key_fails_without_fallback() {
        let result = encode(json!({"foo": 1}), Some(&session(Some("not-a-key".into()))));
        assert!(matches!(result, Err(CodecError::PublicKey(_))));
    }

    #[test]
    fn test_encoded_serializes_flat() {
        let envelope = Envelope {
            encrypted_key: "a".into(),
            iv: "b".into(),
            data: "c".into(),
        };
        let bytes = Encoded::Sealed(envelope).to_json_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"encrypted_key": "a", "iv": "b", "data": "c"}));
    }
}
