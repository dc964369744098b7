//! Per-user local item store.
//!
//! One SQLite file per login under the client base directory. The store is a
//! single-writer per process; a CLI invocation opens it for the duration of
//! one command. Field edits update `updated_at` but never touch `version`;
//! only a successful sync assigns server versions.

pub mod models;

pub use models::{Blob, Item};

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the local store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item with name {0:?} not found")]
    ItemNotFound(String),

    #[error("blob {0:?} not found")]
    BlobNotFound(String),

    #[error("invalid name {0:?} (allowed: letters, digits, . _ -)")]
    InvalidName(String),

    #[error("an item named {0:?} already exists")]
    DuplicateName(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, StoreError>;

const ITEM_COLUMNS: &str = "id, name, created_at, updated_at, version, deleted, file_name, blob_id, \
     login_cipher, login_nonce, password_cipher, password_nonce, \
     text_cipher, text_nonce, card_cipher, card_nonce";

/// SQLite-backed local store for one user's items and blobs.
pub struct ItemStore {
    conn: Connection,
}

impl ItemStore {
    /// Open (creating if needed) the store for `login` under `base`.
    /// Also returns the database file path.
    pub fn open_for_user(base: &Path, login: &str) -> Result<(Self, PathBuf)> {
        if login.is_empty() {
            return Err(StoreError::InvalidName(login.to_string()));
        }
        let dir = base.join(login);
        fs::create_dir_all(&dir)?;
        let db_path = dir.join("client.sqlite");
        let conn = Connection::open(&db_path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok((store, db_path))
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                file_name TEXT NOT NULL DEFAULT '',
                blob_id TEXT NOT NULL DEFAULT '',
                login_cipher BLOB,
                login_nonce BLOB,
                password_cipher BLOB,
                password_nonce BLOB,
                text_cipher BLOB,
                text_nonce BLOB,
                card_cipher BLOB,
                card_nonce BLOB
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_items_name ON items(name);
            CREATE INDEX IF NOT EXISTS idx_items_updated_at ON items(updated_at);

            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                cipher BLOB NOT NULL,
                nonce BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS blob_queue (
                blob_id TEXT PRIMARY KEY,
                queued_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Insert a new item with optional pre-encrypted login/password pairs.
    /// The row starts at `version = 0` (never applied on the server).
    pub fn add_encrypted(
        &self,
        name: &str,
        login: Option<(&[u8], &[u8])>,
        password: Option<(&[u8], &[u8])>,
    ) -> Result<String> {
        validate_name(name)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_unix();

        let result = self.conn.execute(
            "INSERT INTO items (id, name, created_at, updated_at, version, deleted,
                                login_cipher, login_nonce, password_cipher, password_nonce)
             VALUES (?1, ?2, ?3, ?3, 0, 0, ?4, ?5, ?6, ?7)",
            params![
                id,
                name,
                now,
                login.map(|(c, _)| c),
                login.map(|(_, n)| n),
                password.map(|(c, _)| c),
                password.map(|(_, n)| n),
            ],
        );

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateName(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// All items, tombstones included, newest first.
    pub fn list_items(&self) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY updated_at DESC, id"
        ))?;
        let items = stmt
            .query_map([], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Look up an item by exact name.
    pub fn get_item_by_name(&self, name: &str) -> Result<Item> {
        validate_name(name)?;
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE name = ?1"),
                [name],
                row_to_item,
            )
            .optional()?
            .ok_or_else(|| StoreError::ItemNotFound(name.to_string()))
    }

    /// Look up an item by id.
    pub fn get_item_by_id(&self, id: &str) -> Result<Item> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                [id],
                row_to_item,
            )
            .optional()?
            .ok_or_else(|| StoreError::ItemNotFound(id.to_string()))
    }

    /// Write the login slot, creating the item if needed.
    /// Returns `(id, created)`.
    pub fn upsert_login(&self, name: &str, cipher: &[u8], nonce: &[u8]) -> Result<(String, bool)> {
        self.upsert_pair(name, "login_cipher", "login_nonce", cipher, nonce)
    }

    /// Write the password slot, creating the item if needed.
    pub fn upsert_password(
        &self,
        name: &str,
        cipher: &[u8],
        nonce: &[u8],
    ) -> Result<(String, bool)> {
        self.upsert_pair(name, "password_cipher", "password_nonce", cipher, nonce)
    }

    /// Write the free-form text slot, creating the item if needed.
    pub fn upsert_text(&self, name: &str, cipher: &[u8], nonce: &[u8]) -> Result<(String, bool)> {
        self.upsert_pair(name, "text_cipher", "text_nonce", cipher, nonce)
    }

    /// Write the card slot, creating the item if needed.
    pub fn upsert_card(&self, name: &str, cipher: &[u8], nonce: &[u8]) -> Result<(String, bool)> {
        self.upsert_pair(name, "card_cipher", "card_nonce", cipher, nonce)
    }

    /// Attach an encrypted file: stores the blob and points the item at it in
    /// one transaction. Returns `(id, created)`.
    pub fn upsert_file(
        &self,
        name: &str,
        file_name: &str,
        cipher: &[u8],
        nonce: &[u8],
    ) -> Result<(String, bool)> {
        let (id, created) = self.ensure_item(name)?;
        let blob_id = uuid::Uuid::new_v4().to_string();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO blobs (id, cipher, nonce) VALUES (?1, ?2, ?3)",
            params![blob_id, cipher, nonce],
        )?;
        tx.execute(
            "UPDATE items SET file_name = ?1, blob_id = ?2, updated_at = ?3 WHERE id = ?4",
            params![file_name, blob_id, now_unix(), id],
        )?;
        tx.commit()?;
        Ok((id, created))
    }

    /// Fetch a stored blob.
    pub fn get_blob_by_id(&self, id: &str) -> Result<Blob> {
        self.conn
            .query_row(
                "SELECT id, cipher, nonce FROM blobs WHERE id = ?1",
                [id],
                |row| {
                    Ok(Blob {
                        id: row.get(0)?,
                        cipher: row.get(1)?,
                        nonce: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::BlobNotFound(id.to_string()))
    }

    /// Whether a blob is present locally.
    pub fn has_blob(&self, id: &str) -> Result<bool> {
        let present: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blobs WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        Ok(present)
    }

    /// Record the authoritative version returned by the server.
    pub fn set_server_version(&self, id: &str, version: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE items SET version = ?1, updated_at = ?2 WHERE id = ?3",
            params![version, now_unix(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::ItemNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Overwrite every observable column with a server snapshot. Prior field
    /// values are not preserved.
    pub fn upsert_full_from_server(&self, item: &Item) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO items (
                id, name, created_at, updated_at, version, deleted, file_name, blob_id,
                login_cipher, login_nonce, password_cipher, password_nonce,
                text_cipher, text_nonce, card_cipher, card_nonce
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                item.id,
                item.name,
                item.created_at,
                item.updated_at,
                item.version,
                item.deleted,
                item.file_name,
                item.blob_id,
                item.login_cipher,
                item.login_nonce,
                item.password_cipher,
                item.password_nonce,
                item.text_cipher,
                item.text_nonce,
                item.card_cipher,
                item.card_nonce,
            ],
        )?;
        Ok(())
    }

    /// Queue a blob id for later download. Idempotent; returns `true` when
    /// the id was newly queued.
    pub fn enqueue_download(&self, blob_id: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO blob_queue (blob_id, queued_at) VALUES (?1, ?2)",
            params![blob_id, now_unix()],
        )?;
        Ok(inserted > 0)
    }

    /// Blob ids waiting to be downloaded, oldest first.
    pub fn pending_downloads(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT blob_id FROM blob_queue ORDER BY queued_at, blob_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Drop a blob id from the download queue once it has been fetched.
    pub fn remove_download(&self, blob_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM blob_queue WHERE blob_id = ?1", [blob_id])?;
        Ok(())
    }

    // --- Internal helpers ---

    /// Fetch the item id by name, creating a minimal version-0 row when the
    /// name is new. Returns `(id, created)`.
    fn ensure_item(&self, name: &str) -> Result<(String, bool)> {
        validate_name(name)?;
        let existing: Option<String> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(id) = existing {
            return Ok((id, false));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_unix();
        self.conn.execute(
            "INSERT INTO items (id, name, created_at, updated_at, version, deleted)
             VALUES (?1, ?2, ?3, ?3, 0, 0)",
            params![id, name, now],
        )?;
        Ok((id, true))
    }

    fn upsert_pair(
        &self,
        name: &str,
        cipher_col: &str,
        nonce_col: &str,
        cipher: &[u8],
        nonce: &[u8],
    ) -> Result<(String, bool)> {
        let (id, created) = self.ensure_item(name)?;
        self.conn.execute(
            &format!(
                "UPDATE items SET {cipher_col} = ?1, {nonce_col} = ?2, updated_at = ?3 WHERE id = ?4"
            ),
            params![cipher, nonce, now_unix(), id],
        )?;
        Ok((id, created))
    }
}

/// Item names must be CLI-safe: non-empty, `[A-Za-z0-9._-]+`.
pub fn validate_name(name: &str) -> std::result::Result<(), StoreError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        version: row.get(4)?,
        deleted: row.get::<_, i64>(5)? != 0,
        file_name: row.get(6)?,
        blob_id: row.get(7)?,
        login_cipher: row.get(8)?,
        login_nonce: row.get(9)?,
        password_cipher: row.get(10)?,
        password_nonce: row.get(11)?,
        text_cipher: row.get(12)?,
        text_nonce: row.get(13)?,
        card_cipher: row.get(14)?,
        card_nonce: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ItemStore {
        ItemStore::in_memory().unwrap()
    }

    #[test]
    fn add_starts_at_version_zero() {
        let s = store();
        let id = s
            .add_encrypted("site1", Some((b"lc", b"ln")), None)
            .unwrap();
        let item = s.get_item_by_id(&id).unwrap();
        assert_eq!(item.version, 0);
        assert!(!item.deleted);
        assert_eq!(item.login_cipher.as_deref(), Some(&b"lc"[..]));
        assert_eq!(item.login_nonce.as_deref(), Some(&b"ln"[..]));
        assert!(item.password_cipher.is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let s = store();
        s.add_encrypted("dup", None, None).unwrap();
        assert!(matches!(
            s.add_encrypted("dup", None, None),
            Err(StoreError::DuplicateName(_))
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let s = store();
        for bad in ["", "has space", "semi;colon", "путь"] {
            assert!(matches!(
                s.add_encrypted(bad, None, None),
                Err(StoreError::InvalidName(_))
            ));
        }
        assert!(s.add_encrypted("ok.name_1-x", None, None).is_ok());
    }

    #[test]
    fn get_by_name_not_found() {
        let s = store();
        assert!(matches!(
            s.get_item_by_name("missing"),
            Err(StoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn upsert_creates_when_absent() {
        let s = store();
        let (id, created) = s.upsert_text("note", b"tc", b"tn").unwrap();
        assert!(created);

        let item = s.get_item_by_name("note").unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.version, 0);
        assert_eq!(item.text_cipher.as_deref(), Some(&b"tc"[..]));
    }

    #[test]
    fn field_edit_does_not_bump_version() {
        let s = store();
        let id = s.add_encrypted("acct", None, None).unwrap();
        s.set_server_version(&id, 4).unwrap();

        let (_, created) = s.upsert_password("acct", b"pc", b"pn").unwrap();
        assert!(!created);
        assert_eq!(s.get_item_by_id(&id).unwrap().version, 4);
    }

    #[test]
    fn upsert_file_is_transactional() {
        let s = store();
        let (id, _) = s.upsert_file("doc", "report.pdf", b"cipher", b"nonce").unwrap();

        let item = s.get_item_by_id(&id).unwrap();
        assert_eq!(item.file_name, "report.pdf");
        assert!(!item.blob_id.is_empty());

        let blob = s.get_blob_by_id(&item.blob_id).unwrap();
        assert_eq!(blob.cipher, b"cipher");
        assert_eq!(blob.nonce, b"nonce");
    }

    #[test]
    fn replacing_attachment_points_at_new_blob() {
        let s = store();
        let (id, _) = s.upsert_file("doc", "a.bin", b"c1", b"n1").unwrap();
        let first_blob = s.get_item_by_id(&id).unwrap().blob_id;

        s.upsert_file("doc", "b.bin", b"c2", b"n2").unwrap();
        let item = s.get_item_by_id(&id).unwrap();
        assert_ne!(item.blob_id, first_blob);
        assert_eq!(item.file_name, "b.bin");

        // The old blob is kept; blobs are written once and never mutated.
        assert!(s.get_blob_by_id(&first_blob).is_ok());
    }

    #[test]
    fn set_server_version_on_missing_item() {
        let s = store();
        assert!(matches!(
            s.set_server_version("nope", 1),
            Err(StoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn upsert_full_overwrites_everything() {
        let s = store();
        let id = s
            .add_encrypted("snap", Some((b"old-c", b"old-n")), None)
            .unwrap();

        let snapshot = Item {
            id: id.clone(),
            name: "snap".into(),
            created_at: 100,
            updated_at: 200,
            version: 7,
            deleted: false,
            file_name: "f.bin".into(),
            blob_id: "B7".into(),
            text_cipher: Some(b"server-text".to_vec()),
            text_nonce: Some(b"server-nonce".to_vec()),
            ..Default::default()
        };
        s.upsert_full_from_server(&snapshot).unwrap();

        let item = s.get_item_by_id(&id).unwrap();
        assert_eq!(item.version, 7);
        assert_eq!(item.blob_id, "B7");
        // Prior values are not preserved.
        assert!(item.login_cipher.is_none());
        assert_eq!(item.text_cipher.as_deref(), Some(&b"server-text"[..]));
    }

    #[test]
    fn list_orders_newest_first_and_includes_tombstones() {
        let s = store();
        s.add_encrypted("a", None, None).unwrap();
        let id_b = s.add_encrypted("b", None, None).unwrap();

        let tombstone = Item {
            id: id_b.clone(),
            name: "b".into(),
            created_at: 1,
            updated_at: i64::MAX - 1,
            version: 2,
            deleted: true,
            ..Default::default()
        };
        s.upsert_full_from_server(&tombstone).unwrap();

        let items = s.list_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, id_b);
        assert!(items[0].deleted);
    }

    #[test]
    fn download_queue_is_idempotent() {
        let s = store();
        assert!(s.enqueue_download("B1").unwrap());
        assert!(!s.enqueue_download("B1").unwrap());
        assert!(s.enqueue_download("B2").unwrap());

        let pending = s.pending_downloads().unwrap();
        assert_eq!(pending, vec!["B1".to_string(), "B2".to_string()]);

        s.remove_download("B1").unwrap();
        assert_eq!(s.pending_downloads().unwrap(), vec!["B2".to_string()]);
    }
}
