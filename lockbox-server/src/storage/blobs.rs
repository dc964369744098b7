//! Blob table operations.

use super::{Result, Storage};
use rusqlite::params;

impl Storage {
    /// Idempotent blob insert. Returns `true` when this call stored the row;
    /// an existing id keeps its bytes untouched.
    pub fn create_blob_if_absent(&self, id: &str, cipher: &[u8], nonce: &[u8]) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blobs (id, cipher, nonce) VALUES (?1, ?2, ?3)",
            params![id, cipher, nonce],
        )?;
        Ok(inserted > 0)
    }

    /// Stored blob size in bytes, if the blob exists. Used by tests and the
    /// upload handler's idempotent response.
    pub fn blob_size(&self, id: &str) -> Result<Option<usize>> {
        use rusqlite::OptionalExtension;
        let conn = self.conn()?;
        let size: Option<i64> = conn
            .query_row("SELECT length(cipher) FROM blobs WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(size.map(|s| s as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_if_absent_is_idempotent() {
        let storage = Storage::in_memory().unwrap();

        assert!(storage.create_blob_if_absent("B1", b"first", b"n1").unwrap());
        assert!(!storage
            .create_blob_if_absent("B1", b"second", b"n2")
            .unwrap());

        // The first write wins; later bytes never overwrite.
        assert_eq!(storage.blob_size("B1").unwrap(), Some(5));
        assert_eq!(storage.blob_size("B2").unwrap(), None);
    }
}
