//! ChaCha20-Poly1305 encryption transform.
//!
//! Frame body: 12-byte random nonce followed by ciphertext and tag.

use crate::error::CodecError;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;

const NONCE_LEN: usize = 12;

/// Generates a random 256-bit key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[derive(Clone)]
pub struct Cipher {
    inner: ChaCha20Poly1305,
}

impl Cipher {
    pub fn new(key: &[u8; 32]) -> Result<Self, CodecError> {
        let inner = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CodecError::Encryption(format!("invalid key: {e}")))?;
        Ok(Self { inner })
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .inner
            .encrypt(nonce, data)
            .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce_bytes);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        if data.len() < NONCE_LEN {
            return Err(CodecError::Decryption("frame shorter than nonce".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.inner
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decryption("authentication failed".to_string()))
    }
}
