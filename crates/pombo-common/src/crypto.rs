//! Client identifier sealing
//!
//! Provides AES-256-GCM seal/open helpers used to mint opaque client
//! identifiers. The sealed format is:
//! - 12 bytes nonce
//! - Encrypted data
//! - 16 bytes authentication tag (appended by AES-GCM)
//!
//! The final output is base64url encoded (no padding) so identifiers are
//! safe in URLs, headers, and JSON.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL};
use rand::Rng;
use thiserror::Error;

/// Error types for sealing operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("seal failed: {0}")]
    SealFailed(String),

    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

const NONCE_LEN: usize = 12;

/// Symmetric sealed-box over AES-256-GCM.
///
/// Every node in a cluster shares the same key, so an identifier minted by
/// one node can be opened by any other.
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl SecretBox {
    /// Create a sealed box from a raw 32-byte (256-bit) key
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key.into());
        Self { cipher }
    }

    /// Create a sealed box from a base64-encoded key
    pub fn from_base64_key(key: &str) -> CryptoResult<Self> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("failed to convert key".to_string()))?;

        Ok(Self::new(&key_array))
    }

    /// Generate a new random 256-bit key
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key[..]);
        key
    }

    /// Seal plaintext into an opaque base64url token
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes[..]);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::SealFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64URL.encode(sealed))
    }

    /// Open a token previously produced by [`SecretBox::seal`]
    pub fn open(&self, token: &str) -> CryptoResult<Vec<u8>> {
        let sealed = BASE64URL
            .decode(token)
            .map_err(|e| CryptoError::InvalidData(e.to_string()))?;

        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::InvalidData("token too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::OpenFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;

    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = SecretBox::generate_key();
        let sbox = SecretBox::new(&key);

        let token = sbox.seal(b"192.168.1.10:9190|1700000000000").unwrap();
        let opened = sbox.open(&token).unwrap();
        assert_eq!(opened, b"192.168.1.10:9190|1700000000000");
    }

    #[test]
    fn test_seal_is_randomized() {
        let key = SecretBox::generate_key();
        let sbox = SecretBox::new(&key);

        let a = sbox.seal(b"same payload").unwrap();
        let b = sbox.seal(b"same payload").unwrap();
        // Fresh nonce per seal, so tokens differ even for identical input
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sbox_a = SecretBox::new(&SecretBox::generate_key());
        let sbox_b = SecretBox::new(&SecretBox::generate_key());

        let token = sbox_a.seal(b"payload").unwrap();
        assert!(sbox_b.open(&token).is_err());
    }

    #[test]
    fn test_open_garbage_fails() {
        let sbox = SecretBox::new(&SecretBox::generate_key());
        assert!(sbox.open("not-base64!!!").is_err());
        assert!(sbox.open("c2hvcnQ").is_err());
    }

    #[test]
    fn test_from_base64_key() {
        let key = SecretBox::generate_key();
        let encoded = base64::engine::general_purpose::STANDARD.encode(key);
        let sbox = SecretBox::from_base64_key(&encoded).unwrap();

        let token = sbox.seal(b"payload").unwrap();
        assert_eq!(sbox.open(&token).unwrap(), b"payload");
    }

    #[test]
    fn test_from_base64_key_wrong_length() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(SecretBox::from_base64_key(&encoded).is_err());
    }
}
