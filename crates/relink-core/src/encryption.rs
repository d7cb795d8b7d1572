// Note: Deprecation warnings from generic-array 0.14.x are expected
// until aes-gcm 0.11 lands.
#![allow(deprecated)]

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

const NONCE_LENGTH: usize = 12;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Encrypts datasource credentials before they are persisted
#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<[u8; 32]>,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Accepts either a raw 32-byte key or a hex-encoded 64-character key
    pub fn new(key: &str) -> Result<Self, CipherError> {
        let bytes = match key.len() {
            32 => key.as_bytes().to_vec(),
            64 => hex::decode(key).map_err(|e| CipherError::InvalidKey(e.to_string()))?,
            other => {
                return Err(CipherError::InvalidKey(format!(
                    "expected 32 bytes or 64 hex characters, got {} characters",
                    other
                )))
            }
        };

        let mut raw = [0u8; 32];
        raw.copy_from_slice(&bytes);
        Ok(Self { key: Arc::new(raw) })
    }

    /// Derive a key from a passphrase with SHA-256
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&digest);
        Self { key: Arc::new(raw) }
    }

    /// Returns base64(nonce || ciphertext)
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let cipher = Aes256Gcm::new(self.key.as_slice().into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut combined = nonce.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CipherError> {
        let data = BASE64
            .decode(encoded)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;
        if data.len() < NONCE_LENGTH {
            return Err(CipherError::Decrypt("payload too short".to_string()));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new(self.key.as_slice().into());
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }

    pub fn encrypt_json<T: serde::Serialize>(&self, value: &T) -> Result<String, CipherError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CipherError::Encrypt(e.to_string()))?;
        self.encrypt(&bytes)
    }

    pub fn decrypt_json<T: serde::de::DeserializeOwned>(
        &self,
        encoded: &str,
    ) -> Result<T, CipherError> {
        let bytes = self.decrypt(encoded)?;
        serde_json::from_slice(&bytes).map_err(|e| CipherError::Decrypt(e.to_string()))
    }

    /// Random 32-byte key, hex encoded, suitable for [`CredentialCipher::new`]
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_key() {
        assert!(matches!(
            CredentialCipher::new("too-short"),
            Err(CipherError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_encrypt_produces_fresh_nonce_each_time() {
        let cipher = CredentialCipher::new(&CredentialCipher::generate_key()).unwrap();

        let first = cipher.encrypt(b"secret").unwrap();
        let second = cipher.encrypt(b"secret").unwrap();

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).unwrap(), b"secret");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let cipher = CredentialCipher::from_passphrase("one");
        let other = CredentialCipher::from_passphrase("two");

        let sealed = cipher.encrypt(b"password").unwrap();

        assert!(other.decrypt(&sealed).is_err());
    }
}
