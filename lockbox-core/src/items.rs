//! Local item operations: encrypt-on-write edits and decrypted views.
//!
//! All plaintext handling happens here, on the client. The store below this
//! layer only ever sees `(cipher, nonce)` pairs.

use crate::crypto::{decrypt, encrypt, FieldKey};
use crate::store::{Item, ItemStore};
use crate::{LockboxError, Result};
use std::path::Path;

/// Rendered in place of a field that has no value.
pub const NOT_SET: &str = "<not set>";

/// Rendered in place of a field that failed to decrypt. Display never
/// crashes on bad ciphertext; the listing continues.
pub const DECRYPT_ERROR: &str = "<decrypt error>";

/// A single field edit, already validated by the caller.
#[derive(Debug, Clone)]
pub enum FieldEdit {
    Login(String),
    Password(String),
    Text(String),
    Card {
        number: String,
        card_holder: String,
        exp: String,
        cvc: String,
    },
    /// Path to a local file to encrypt and attach.
    File(String),
}

/// An item with its secret fields decrypted for display.
#[derive(Debug, Clone)]
pub struct DecryptedItem {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    pub deleted: bool,
    pub login: String,
    pub password: String,
    pub text: String,
    pub card: String,
    pub file_name: String,
}

/// Use-case layer over the local store for one user.
pub struct ItemService<'a> {
    store: &'a ItemStore,
    key: FieldKey,
}

impl<'a> ItemService<'a> {
    pub fn new(store: &'a ItemStore, key: FieldKey) -> Self {
        Self { store, key }
    }

    /// Create a new item, encrypting the optional login/password first.
    pub fn add(&self, name: &str, login: Option<&str>, password: Option<&str>) -> Result<String> {
        let login_pair = login
            .map(|v| encrypt(v.as_bytes(), &self.key))
            .transpose()?;
        let password_pair = password
            .map(|v| encrypt(v.as_bytes(), &self.key))
            .transpose()?;

        let id = self.store.add_encrypted(
            name,
            login_pair.as_ref().map(|(c, n)| (c.as_slice(), n.as_slice())),
            password_pair
                .as_ref()
                .map(|(c, n)| (c.as_slice(), n.as_slice())),
        )?;
        Ok(id)
    }

    /// All items, newest first.
    pub fn list(&self) -> Result<Vec<Item>> {
        Ok(self.store.list_items()?)
    }

    /// Encrypt and write one field. Returns `(id, created)`.
    pub fn edit(&self, name: &str, edit: FieldEdit) -> Result<(String, bool)> {
        let result = match edit {
            FieldEdit::Login(v) => {
                let (c, n) = encrypt(v.as_bytes(), &self.key)?;
                self.store.upsert_login(name, &c, &n)?
            }
            FieldEdit::Password(v) => {
                let (c, n) = encrypt(v.as_bytes(), &self.key)?;
                self.store.upsert_password(name, &c, &n)?
            }
            FieldEdit::Text(v) => {
                let (c, n) = encrypt(v.as_bytes(), &self.key)?;
                self.store.upsert_text(name, &c, &n)?
            }
            FieldEdit::Card {
                number,
                card_holder,
                exp,
                cvc,
            } => {
                let payload = serde_json::json!({
                    "number": number,
                    "card_holder": card_holder,
                    "exp": exp,
                    "cvc": cvc,
                })
                .to_string();
                let (c, n) = encrypt(payload.as_bytes(), &self.key)?;
                self.store.upsert_card(name, &c, &n)?
            }
            FieldEdit::File(path) => {
                let data = std::fs::read(&path)
                    .map_err(|e| LockboxError::InvalidInput(format!("read {}: {}", path, e)))?;
                let (c, n) = encrypt(&data, &self.key)?;
                let file_name = Path::new(&path)
                    .file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or("attachment")
                    .to_string();
                self.store.upsert_file(name, &file_name, &c, &n)?
            }
        };
        Ok(result)
    }

    /// Fetch an item by name and decrypt its fields for display.
    pub fn get_decrypted(&self, name: &str) -> Result<DecryptedItem> {
        let item = self.store.get_item_by_name(name)?;
        Ok(self.decrypt_view(&item))
    }

    /// Decrypt the four secret fields, substituting sentinels for missing
    /// values and failed decrypts.
    pub fn decrypt_view(&self, item: &Item) -> DecryptedItem {
        DecryptedItem {
            id: item.id.clone(),
            name: item.name.clone(),
            created_at: item.created_at,
            updated_at: item.updated_at,
            version: item.version,
            deleted: item.deleted,
            login: self.render_field(&item.login_cipher, &item.login_nonce),
            password: self.render_field(&item.password_cipher, &item.password_nonce),
            text: self.render_field(&item.text_cipher, &item.text_nonce),
            card: self.render_field(&item.card_cipher, &item.card_nonce),
            file_name: if item.file_name.is_empty() {
                NOT_SET.to_string()
            } else {
                item.file_name.clone()
            },
        }
    }

    fn render_field(&self, cipher: &Option<Vec<u8>>, nonce: &Option<Vec<u8>>) -> String {
        let (Some(cipher), Some(nonce)) = (cipher, nonce) else {
            return NOT_SET.to_string();
        };
        if cipher.is_empty() || nonce.is_empty() {
            return NOT_SET.to_string();
        }
        match decrypt(cipher, nonce, &self.key) {
            Ok(plain) => String::from_utf8(plain).unwrap_or_else(|_| DECRYPT_ERROR.to_string()),
            Err(_) => DECRYPT_ERROR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(store: &ItemStore) -> ItemService<'_> {
        ItemService::new(store, FieldKey::generate())
    }

    #[test]
    fn add_and_get_roundtrip() {
        let store = ItemStore::in_memory().unwrap();
        let svc = service(&store);

        svc.add("mail", Some("alice@example.com"), Some("hunter2"))
            .unwrap();
        let view = svc.get_decrypted("mail").unwrap();

        assert_eq!(view.login, "alice@example.com");
        assert_eq!(view.password, "hunter2");
        assert_eq!(view.text, NOT_SET);
        assert_eq!(view.card, NOT_SET);
        assert_eq!(view.file_name, NOT_SET);
    }

    #[test]
    fn edit_card_packs_json() {
        let store = ItemStore::in_memory().unwrap();
        let svc = service(&store);

        svc.edit(
            "wallet",
            FieldEdit::Card {
                number: "4111111111111111".into(),
                card_holder: "ALICE EXAMPLE".into(),
                exp: "12/28".into(),
                cvc: "007".into(),
            },
        )
        .unwrap();

        let view = svc.get_decrypted("wallet").unwrap();
        let card: serde_json::Value = serde_json::from_str(&view.card).unwrap();
        assert_eq!(card["number"], "4111111111111111");
        assert_eq!(card["cvc"], "007");
    }

    #[test]
    fn foreign_key_shows_sentinel() {
        let store = ItemStore::in_memory().unwrap();
        let writer = service(&store);
        writer.add("acct", Some("user"), None).unwrap();

        // A different key (e.g. from a racing first-write) cannot decrypt.
        let reader = service(&store);
        let view = reader.get_decrypted("acct").unwrap();
        assert_eq!(view.login, DECRYPT_ERROR);
        assert_eq!(view.password, NOT_SET);
    }

    #[test]
    fn file_edit_encrypts_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"attachment body").unwrap();

        let store = ItemStore::in_memory().unwrap();
        let svc = service(&store);
        let (id, created) = svc
            .edit("doc", FieldEdit::File(path.to_str().unwrap().into()))
            .unwrap();
        assert!(created);

        let item = store.get_item_by_id(&id).unwrap();
        assert_eq!(item.file_name, "note.txt");
        let blob = store.get_blob_by_id(&item.blob_id).unwrap();
        assert_ne!(blob.cipher, b"attachment body");
        let plain = decrypt(&blob.cipher, &blob.nonce, svc_key(&svc)).unwrap();
        assert_eq!(plain, b"attachment body");
    }

    fn svc_key<'a>(svc: &'a ItemService<'_>) -> &'a FieldKey {
        &svc.key
    }
}
