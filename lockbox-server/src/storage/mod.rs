//! SQLite storage backend for the server.
//!
//! One database holds every user's rows; items are scoped by `user_id` and
//! the only mutating item primitive is the compare-and-set
//! [`Storage::update_with_version`]. Blobs are content-opaque and shared
//! across users.

mod blobs;
mod items;
mod models;
mod users;

pub use models::{ItemPatch, ItemRow};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("login {0:?} already exists")]
    LoginTaken(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Thread-safe server storage.
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                id TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL DEFAULT '',
                file_name TEXT NOT NULL DEFAULT '',
                blob_id TEXT,
                version INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                login_cipher BLOB,
                login_nonce BLOB,
                password_cipher BLOB,
                password_nonce BLOB,
                text_cipher BLOB,
                text_nonce BLOB,
                card_cipher BLOB,
                card_nonce BLOB,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_items_user_updated
                ON items(user_id, updated_at);

            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                cipher BLOB NOT NULL,
                nonce BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

/// Current time as unix microseconds; the resolution used for `updated_at`
/// comparisons and the `server_time` watermark.
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
