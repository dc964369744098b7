//! Local store row types.

/// A locally stored item.
///
/// `version` is the server version last acknowledged for this row; `0` means
/// the record was created locally and has never been applied on the server.
/// Timestamps are unix seconds and are only used to order local listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    pub deleted: bool,
    /// Display name of the binary attachment; empty when there is none.
    pub file_name: String,
    /// Reference into the blob table; empty when there is no attachment.
    pub blob_id: String,
    pub login_cipher: Option<Vec<u8>>,
    pub login_nonce: Option<Vec<u8>>,
    pub password_cipher: Option<Vec<u8>>,
    pub password_nonce: Option<Vec<u8>>,
    pub text_cipher: Option<Vec<u8>>,
    pub text_nonce: Option<Vec<u8>>,
    pub card_cipher: Option<Vec<u8>>,
    pub card_nonce: Option<Vec<u8>>,
}

impl Item {
    /// Whether a slot holds a usable value (cipher and nonce both present).
    pub fn has_pair(cipher: &Option<Vec<u8>>, nonce: &Option<Vec<u8>>) -> bool {
        matches!((cipher, nonce), (Some(c), Some(n)) if !c.is_empty() && !n.is_empty())
    }
}

/// An opaque encrypted binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub id: String,
    pub cipher: Vec<u8>,
    pub nonce: Vec<u8>,
}
