//! AES-256-GCM encryption and decryption for item fields.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key
//! - 96-bit (12 byte) random nonce, fresh per call
//! - 128-bit authentication tag appended to the ciphertext
//!
//! The envelope is per-field rather than per-item so a single field can be
//! upserted without re-encrypting the others.

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroize;

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes (GCM standard).
pub const NONCE_LEN: usize = 12;

/// A per-user field encryption key.
///
/// Created lazily the first time a field must be encrypted for the user and
/// persisted under the user's local profile. Zeroized on drop.
#[derive(Clone)]
pub struct FieldKey {
    key: [u8; KEY_LEN],
}

impl FieldKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self { key: key.into() }
    }

    /// Build a key from raw bytes, validating the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                got: bytes.len(),
            })?;
        Ok(Self { key })
    }

    /// Raw key bytes (use sparingly).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for FieldKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Encrypt a field plaintext, returning `(cipher, nonce)`.
///
/// The nonce is generated randomly for each encryption and must be stored
/// alongside the ciphertext; the GCM tag is carried inside `cipher`.
pub fn encrypt(plain: &[u8], key: &FieldKey) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plain)
        .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;
    Ok((sealed, nonce.to_vec()))
}

/// Decrypt a `(cipher, nonce)` pair produced by [`encrypt`].
///
/// Fails with [`CryptoError::DecryptionFailed`] on tag mismatch or a wrong
/// key, and with [`CryptoError::InvalidNonceLength`] when the stored nonce is
/// not 12 bytes.
pub fn decrypt(ciphertext: &[u8], nonce: &[u8], key: &FieldKey) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_LEN,
            got: nonce.len(),
        });
    }
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
