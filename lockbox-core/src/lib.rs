//! Lockbox Core Library
//!
//! Core functionality for the lockbox secrets manager: the per-user crypto
//! envelope, the local encrypted item store, the sync wire models shared with
//! the server, and the client-side sync orchestrator.

pub mod config;
pub mod crypto;
pub mod items;
pub mod platform;
pub mod session;
pub mod store;
pub mod sync;

pub use config::ClientConfig;
pub use crypto::{decrypt, encrypt, load_or_create_key, CryptoError, FieldKey};
pub use items::{DecryptedItem, FieldEdit, ItemService, DECRYPT_ERROR, NOT_SET};
pub use session::Session;
pub use store::{Blob, Item, ItemStore, StoreError};
pub use sync::client::ApiClient;
pub use sync::engine::{BatchOptions, BatchSummary, SyncEngine, SyncOutcome, UploadReceipt};

use thiserror::Error;

/// Result type for lockbox client operations.
pub type Result<T> = std::result::Result<T, LockboxError>;

/// General error type for lockbox client operations.
#[derive(Error, Debug)]
pub enum LockboxError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No active user: run login or register first")]
    NoActiveUser,

    #[error("Server returned status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Server applied version {new_version} for {id} but persisting it locally failed: {source}")]
    PersistVersion {
        id: String,
        new_version: i64,
        source: StoreError,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
