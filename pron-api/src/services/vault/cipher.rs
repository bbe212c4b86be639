//! Symmetric authenticated encryption for stored recordings
//!
//! Tokens are URL-safe base64 text:
//! `version (1 byte, 0x80) || nonce (12 bytes) || AES-256-GCM ciphertext+tag`.
//! Any failure to open a token (wrong key, truncation, tampering, bad
//! encoding) is reported as [`CipherError::InvalidToken`].

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use pron_common::config::{decode_encryption_key, ENCRYPTION_KEY_LEN, KEY_ENGINE};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const TOKEN_VERSION: u8 = 0x80;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Wrong key or corrupted/truncated ciphertext
    #[error("Invalid token: audio could not be decrypted with the configured key")]
    InvalidToken,

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

/// Encrypts and decrypts recordings with one configured key
#[derive(Clone)]
pub struct AudioCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for AudioCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCipher").finish_non_exhaustive()
    }
}

impl AudioCipher {
    /// Build from the URL-safe base64 key text (`ENCRYPTION_KEY`)
    pub fn from_key_str(key: &str) -> Result<Self, CipherError> {
        let bytes = decode_encryption_key(key).map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Self::from_key_bytes(&bytes)
    }

    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            CipherError::InvalidKey(format!(
                "key must be {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                key.len()
            ))
        })?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` into a token; a fresh random nonce is used every call
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // Encryption only fails on absurd (> 64 GiB) inputs
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::InvalidToken)?;

        let mut raw = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        raw.push(TOKEN_VERSION);
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);

        Ok(KEY_ENGINE.encode(raw).into_bytes())
    }

    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CipherError> {
        let raw = KEY_ENGINE
            .decode(token)
            .map_err(|_| CipherError::InvalidToken)?;

        if raw.len() < 1 + NONCE_LEN + TAG_LEN || raw[0] != TOKEN_VERSION {
            return Err(CipherError::InvalidToken);
        }

        let (nonce_bytes, ciphertext) = raw[1..].split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::InvalidToken)
    }
}

/// Fresh random key in `ENCRYPTION_KEY` format
pub fn generate_key() -> String {
    let mut key = [0u8; ENCRYPTION_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    KEY_ENGINE.encode(key)
}

/// Re-encrypt a token from `old` to `new`; the plaintext stays in memory only
pub fn rotate_key(
    old: &AudioCipher,
    new: &AudioCipher,
    token: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let plaintext = old.decrypt(token)?;
    new.encrypt(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AudioCipher {
        AudioCipher::from_key_str(&generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip_edge_sizes() {
        let cipher = cipher();
        let large: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        for payload in [Vec::new(), b"RIFF".to_vec(), large] {
            let token = cipher.encrypt(&payload).unwrap();
            assert_eq!(cipher.decrypt(&token).unwrap(), payload);
        }
    }

    #[test]
    fn test_token_is_url_safe_text() {
        let token = cipher().encrypt(b"hello").unwrap();
        let text = String::from_utf8(token).unwrap();
        assert!(text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='));
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_is_invalid_token() {
        let token = cipher().encrypt(b"secret audio").unwrap();
        assert_eq!(cipher().decrypt(&token), Err(CipherError::InvalidToken));
    }

    #[test]
    fn test_corruption_is_invalid_token() {
        let cipher = cipher();
        let mut token = cipher.encrypt(b"secret audio").unwrap();

        let truncated = &token[..token.len() / 2];
        assert_eq!(cipher.decrypt(truncated), Err(CipherError::InvalidToken));

        assert_eq!(cipher.decrypt(b"not a token!"), Err(CipherError::InvalidToken));

        let middle = token.len() / 2;
        token[middle] = if token[middle] == b'A' { b'B' } else { b'A' };
        assert_eq!(cipher.decrypt(&token), Err(CipherError::InvalidToken));
    }

    #[test]
    fn test_rotate_key() {
        let old = cipher();
        let new = cipher();
        let token = old.encrypt(b"recording").unwrap();

        let rotated = rotate_key(&old, &new, &token).unwrap();
        assert_eq!(new.decrypt(&rotated).unwrap(), b"recording");
        assert_eq!(old.decrypt(&rotated), Err(CipherError::InvalidToken));

        assert_eq!(rotate_key(&new, &old, &token), Err(CipherError::InvalidToken));
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(matches!(
            AudioCipher::from_key_str("short"),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(AudioCipher::from_key_bytes(&[0u8; 16]).is_err());
    }
}
