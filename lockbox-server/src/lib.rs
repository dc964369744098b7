//! Lockbox sync server library.
//!
//! The server stores only opaque ciphertexts for each user's items and
//! blobs; it never possesses encryption keys or plaintext data. The sync
//! endpoint reconciles client batches under optimistic concurrency.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod reconcile;
pub mod server;
pub mod storage;

pub use config::ServerConfig;
pub use server::build_router;
pub use storage::Storage;
