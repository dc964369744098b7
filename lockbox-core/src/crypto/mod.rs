//! Cryptographic envelope for item fields.
//!
//! Every secret field is encrypted on the client into an opaque
//! `(cipher, nonce)` pair before it ever reaches the server. This module
//! provides:
//! - AES-256-GCM field encryption/decryption
//! - lazy per-user key creation and loading

pub mod cipher;
pub mod keyfile;

pub use cipher::{decrypt, encrypt, FieldKey, KEY_LEN, NONCE_LEN};
pub use keyfile::load_or_create_key;

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid nonce length: expected {expected}, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("Decryption failed - wrong key or data tampered with")]
    DecryptionFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
