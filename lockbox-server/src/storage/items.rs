//! Item table operations.
//!
//! `update_with_version` is the single primitive that mutates an item; it
//! matches the row by `(user_id, id, version)` so two concurrent writers
//! with the same expected version cannot both succeed.

use super::models::{ItemPatch, ItemRow};
use super::{now_micros, Result, Storage};
use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension};

const ITEM_COLUMNS: &str = "id, user_id, name, file_name, blob_id, version, deleted, \
     login_cipher, login_nonce, password_cipher, password_nonce, \
     text_cipher, text_nonce, card_cipher, card_nonce, created_at, updated_at";

impl Storage {
    /// Fetch one item of one user.
    pub fn get_by_id(&self, user_id: i64, id: &str) -> Result<Option<ItemRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE user_id = ?1 AND id = ?2"),
                params![user_id, id],
                row_to_item,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a new item row. Fails when `(user_id, id)` already exists.
    pub fn create(&self, row: &ItemRow) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO items (
                id, user_id, name, file_name, blob_id, version, deleted,
                login_cipher, login_nonce, password_cipher, password_nonce,
                text_cipher, text_nonce, card_cipher, card_nonce,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                row.id,
                row.user_id,
                row.name,
                row.file_name,
                row.blob_id,
                row.version,
                row.deleted,
                row.login_cipher,
                row.login_nonce,
                row.password_cipher,
                row.password_nonce,
                row.text_cipher,
                row.text_nonce,
                row.card_cipher,
                row.card_nonce,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Atomic compare-and-set update.
    ///
    /// Applies `patch` to the row matching `(user_id, id, expected_version)`,
    /// bumps `version` and rewrites `updated_at`. Returns the new version, or
    /// `None` when no row matched (absent or stale).
    pub fn update_with_version(
        &self,
        user_id: i64,
        id: &str,
        expected_version: i64,
        patch: &ItemPatch,
    ) -> Result<Option<i64>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(file_name) = &patch.file_name {
            sets.push("file_name = ?");
            values.push(Box::new(file_name.clone()));
        }
        if let Some(blob_id) = &patch.blob_id {
            sets.push("blob_id = ?");
            values.push(Box::new(blob_id.clone()));
        }
        if let Some(deleted) = patch.deleted {
            sets.push("deleted = ?");
            values.push(Box::new(deleted));
        }
        push_slot(&mut sets, &mut values, "login_cipher = ?", &patch.login_cipher);
        push_slot(&mut sets, &mut values, "login_nonce = ?", &patch.login_nonce);
        push_slot(
            &mut sets,
            &mut values,
            "password_cipher = ?",
            &patch.password_cipher,
        );
        push_slot(
            &mut sets,
            &mut values,
            "password_nonce = ?",
            &patch.password_nonce,
        );
        push_slot(&mut sets, &mut values, "text_cipher = ?", &patch.text_cipher);
        push_slot(&mut sets, &mut values, "text_nonce = ?", &patch.text_nonce);
        push_slot(&mut sets, &mut values, "card_cipher = ?", &patch.card_cipher);
        push_slot(&mut sets, &mut values, "card_nonce = ?", &patch.card_nonce);

        sets.push("version = version + 1");
        sets.push("updated_at = ?");
        values.push(Box::new(now_micros()));

        values.push(Box::new(user_id));
        values.push(Box::new(id.to_string()));
        values.push(Box::new(expected_version));

        let sql = format!(
            "UPDATE items SET {} WHERE user_id = ? AND id = ? AND version = ?",
            sets.join(", ")
        );

        let conn = self.conn()?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = conn.execute(&sql, refs.as_slice())?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(expected_version + 1))
    }

    /// Items of `user_id` with `updated_at` strictly after `since_micros`,
    /// oldest first.
    pub fn get_items_updated_since(&self, user_id: i64, since_micros: i64) -> Result<Vec<ItemRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE user_id = ?1 AND updated_at > ?2
             ORDER BY updated_at ASC, id"
        ))?;
        let rows = stmt
            .query_map(params![user_id, since_micros], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every item of `user_id`, oldest first.
    pub fn list_all(&self, user_id: i64) -> Result<Vec<ItemRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE user_id = ?1 ORDER BY updated_at ASC, id"
        ))?;
        let rows = stmt
            .query_map(params![user_id], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn push_slot(
    sets: &mut Vec<&str>,
    values: &mut Vec<Box<dyn ToSql>>,
    clause: &'static str,
    slot: &Option<Vec<u8>>,
) {
    if let Some(bytes) = slot {
        sets.push(clause);
        // An explicitly empty slice clears the slot to NULL.
        if bytes.is_empty() {
            values.push(Box::new(None::<Vec<u8>>));
        } else {
            values.push(Box::new(bytes.clone()));
        }
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        file_name: row.get(3)?,
        blob_id: row.get(4)?,
        version: row.get(5)?,
        deleted: row.get::<_, i64>(6)? != 0,
        login_cipher: row.get(7)?,
        login_nonce: row.get(8)?,
        password_cipher: row.get(9)?,
        password_nonce: row.get(10)?,
        text_cipher: row.get(11)?,
        text_nonce: row.get(12)?,
        card_cipher: row.get(13)?,
        card_nonce: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}
