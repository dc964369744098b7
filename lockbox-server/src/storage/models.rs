//! Server-side row types.

/// An authoritative item row.
///
/// `updated_at`/`created_at` are unix microseconds; `version` starts at 1 on
/// creation and only moves through the compare-and-set update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRow {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub file_name: String,
    pub blob_id: Option<String>,
    pub version: i64,
    pub deleted: bool,
    pub login_cipher: Option<Vec<u8>>,
    pub login_nonce: Option<Vec<u8>>,
    pub password_cipher: Option<Vec<u8>>,
    pub password_nonce: Option<Vec<u8>>,
    pub text_cipher: Option<Vec<u8>>,
    pub text_nonce: Option<Vec<u8>>,
    pub card_cipher: Option<Vec<u8>>,
    pub card_nonce: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ItemRow {
    /// Whether a stored slot holds a value.
    pub fn slot_set(slot: &Option<Vec<u8>>) -> bool {
        slot.as_ref().is_some_and(|b| !b.is_empty())
    }
}

/// A partial update produced from one sync change.
///
/// Absent (`None`) fields are not touched. `blob_id` is three-state:
/// absent / `Some(None)` to clear / `Some(Some(id))` to set. Cipher slots
/// clear when set to an empty slice.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub blob_id: Option<Option<String>>,
    pub deleted: Option<bool>,
    pub login_cipher: Option<Vec<u8>>,
    pub login_nonce: Option<Vec<u8>>,
    pub password_cipher: Option<Vec<u8>>,
    pub password_nonce: Option<Vec<u8>>,
    pub text_cipher: Option<Vec<u8>>,
    pub text_nonce: Option<Vec<u8>>,
    pub card_cipher: Option<Vec<u8>>,
    pub card_nonce: Option<Vec<u8>>,
}
