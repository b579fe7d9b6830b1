//! Authenticated encoding of the `state` parameter carried through the
//! provider redirect.
//!
//! Tokens are `base64url(version || nonce || ciphertext)` where the ciphertext
//! is AES-256-GCM over the JSON form of a [`CorrelationRecord`]. The version
//! byte is bound as associated data, so any modification of the token is
//! rejected rather than decoded into a different record.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::RelayError;

const TOKEN_VERSION: u8 = 1;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Payload linking an authorization request to the paused action behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationRecord {
    pub correlation_id: Uuid,
    pub identity: String,
}

impl CorrelationRecord {
    /// Mint a record with a fresh random correlation id.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            identity: identity.into(),
        }
    }
}

#[derive(Clone)]
pub struct StateCodec {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl StateCodec {
    /// Build a codec from URL-safe base64 key material (32 bytes, padding optional).
    pub fn from_key_material(material: &str) -> Result<Self, RelayError> {
        let trimmed = material.trim().trim_end_matches('=');
        if trimmed.is_empty() {
            return Err(RelayError::KeyInitialization(
                "no state key configured; run `oauth-relay gen-key`".into(),
            ));
        }
        let bytes = URL_SAFE_NO_PAD.decode(trimmed).map_err(|e| {
            RelayError::KeyInitialization(format!("state key is not URL-safe base64: {e}"))
        })?;
        Self::from_key(&bytes)
    }

    /// Build a codec from raw key bytes.
    pub fn from_key(key: &[u8]) -> Result<Self, RelayError> {
        if key.len() != KEY_LEN {
            return Err(RelayError::KeyInitialization(format!(
                "expected {KEY_LEN} key bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| RelayError::KeyInitialization(e.to_string()))?;
        Ok(Self {
            cipher,
            fingerprint: fingerprint(key),
        })
    }

    /// Short SHA-256 prefix of the key, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn encode(&self, record: &CorrelationRecord) -> Result<String, RelayError> {
        let plaintext = serde_json::to_vec(record)
            .map_err(|e| RelayError::InvalidToken(format!("cannot serialize record: {e}")))?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: &[TOKEN_VERSION],
                },
            )
            .map_err(|_| RelayError::InvalidToken("encryption failed".into()))?;

        let mut raw = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        raw.push(TOKEN_VERSION);
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    pub fn decode(&self, token: &str) -> Result<CorrelationRecord, RelayError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| RelayError::InvalidToken("not URL-safe base64".into()))?;

        if raw.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(RelayError::InvalidToken("token truncated".into()));
        }
        let (version, rest) = raw.split_at(1);
        if version[0] != TOKEN_VERSION {
            return Err(RelayError::InvalidToken(format!(
                "unsupported token version {}",
                version[0]
            )));
        }
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: version,
                },
            )
            .map_err(|_| RelayError::InvalidToken("authentication failed".into()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| RelayError::InvalidToken(format!("malformed record: {e}")))
    }
}

impl fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCodec")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Generate fresh key material in the format accepted by [`StateCodec::from_key_material`].
pub fn generate_key() -> String {
    let key: [u8; KEY_LEN] = rand::random();
    URL_SAFE_NO_PAD.encode(key)
}

fn fingerprint(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: u8) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = seed.wrapping_add(i as u8);
        }
        key
    }

    fn codec(seed: u8) -> StateCodec {
        StateCodec::from_key(&test_key(seed)).unwrap()
    }

    #[test]
    fn roundtrip_preserves_record() {
        let codec = codec(0);
        for identity in ["U024BE7LH", "", "user with spaces", "ünïcødé/&?=#", "a\"quoted\"\\name"] {
            let record = CorrelationRecord::new(identity);
            let token = codec.encode(&record).unwrap();
            assert_eq!(codec.decode(&token).unwrap(), record);
        }
    }

    #[test]
    fn token_is_url_safe() {
        let token = codec(0).encode(&CorrelationRecord::new("u1")).unwrap();
        for ch in token.chars() {
            assert!(
                ch.is_ascii_alphanumeric() || ch == '-' || ch == '_',
                "Invalid char in token: '{ch}'"
            );
        }
    }

    #[test]
    fn same_record_encodes_to_distinct_tokens() {
        let codec = codec(0);
        let record = CorrelationRecord::new("u1");
        let a = codec.encode(&record).unwrap();
        let b = codec.encode(&record).unwrap();
        assert_ne!(a, b);
        assert_eq!(codec.decode(&a).unwrap(), codec.decode(&b).unwrap());
    }

    #[test]
    fn flipping_any_byte_is_rejected() {
        let codec = codec(0);
        let token = codec.encode(&CorrelationRecord::new("u1")).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let result = codec.decode(&URL_SAFE_NO_PAD.encode(&tampered));
            assert!(
                matches!(result, Err(RelayError::InvalidToken(_))),
                "byte {i} flip was accepted"
            );
        }
    }

    #[test]
    fn altering_any_character_is_rejected() {
        let codec = codec(0);
        let token = codec.encode(&CorrelationRecord::new("u1")).unwrap();

        for i in 0..token.len() {
            let mut chars: Vec<char> = token.chars().collect();
            chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
            let tampered: String = chars.into_iter().collect();
            assert!(
                matches!(codec.decode(&tampered), Err(RelayError::InvalidToken(_))),
                "char {i} change was accepted"
            );
        }
    }

    #[test]
    fn truncated_token_is_rejected() {
        let codec = codec(0);
        let token = codec.encode(&CorrelationRecord::new("u1")).unwrap();
        for len in [0, 4, 16, token.len() - 1] {
            assert!(matches!(
                codec.decode(&token[..len]),
                Err(RelayError::InvalidToken(_))
            ));
        }
    }

    #[test]
    fn foreign_key_is_rejected() {
        let token = codec(0).encode(&CorrelationRecord::new("u1")).unwrap();
        assert!(matches!(
            codec(1).decode(&token),
            Err(RelayError::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = codec(0);
        for token in ["garbage-token", "", "!!!", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"] {
            assert!(matches!(codec.decode(token), Err(RelayError::InvalidToken(_))));
        }
    }

    #[test]
    fn key_material_roundtrip() {
        let material = generate_key();
        assert_eq!(material.len(), 43);
        let codec = StateCodec::from_key_material(&material).unwrap();
        let record = CorrelationRecord::new("u1");
        assert_eq!(codec.decode(&codec.encode(&record).unwrap()).unwrap(), record);
    }

    #[test]
    fn padded_key_material_is_accepted() {
        let material = format!("{}=", URL_SAFE_NO_PAD.encode(test_key(3)));
        assert!(StateCodec::from_key_material(&material).is_ok());
    }

    #[test]
    fn missing_key_material_fails() {
        for material in ["", "   ", "="] {
            assert!(matches!(
                StateCodec::from_key_material(material),
                Err(RelayError::KeyInitialization(_))
            ));
        }
    }

    #[test]
    fn malformed_key_material_fails() {
        assert!(matches!(
            StateCodec::from_key_material("not base64 at all!"),
            Err(RelayError::KeyInitialization(_))
        ));
        let short = URL_SAFE_NO_PAD.encode([7u8; 16]);
        assert!(matches!(
            StateCodec::from_key_material(&short),
            Err(RelayError::KeyInitialization(_))
        ));
    }

    #[test]
    fn debug_does_not_expose_key() {
        let codec = codec(0);
        let debug = format!("{codec:?}");
        assert!(debug.contains(codec.fingerprint()));
        assert_eq!(codec.fingerprint().len(), 12);
    }
}
