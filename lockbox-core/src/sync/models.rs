//! Sync wire format.
//!
//! These types define the JSON schema of `POST /api/items/sync` and are the
//! single definition shared by the client orchestrator and the server
//! reconciler. Ciphertext slots travel as base64 strings; an *absent* field
//! means "do not touch", while an explicitly empty value means "clear".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Watermark meaning "give me everything".
pub const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

/// Per-change conflict-resolution directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvePolicy {
    /// The client copy is authoritative: apply it over the server state.
    Client,
    /// The server copy is authoritative: report a conflict with a full
    /// snapshot and leave the row untouched.
    Server,
}

/// One change in a sync batch. Every field except `id` is optional; absent
/// fields are not touched on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemChange {
    pub id: String,

    /// The client's notion of the server version; `0` for a locally-new row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve: Option<ResolvePolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Empty string clears the reference to null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub login_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub login_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub password_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub password_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub text_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub text_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub card_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub card_nonce: Option<Vec<u8>>,
}

/// Request body of `POST /api/items/sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// RFC3339 watermark scoping `server_changes`. Kept as a string on the
    /// wire: a malformed value is ignored by the server, not rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<String>,

    /// When set, the response includes full snapshots of items the request
    /// did not mention.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub want_missing: bool,

    pub changes: Vec<ItemChange>,
}

/// A successfully applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applied {
    pub id: String,
    pub new_version: i64,
}

/// Why a change was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NotFound,
    VersionConflict,
    InternalError,
}

/// A rejected change, optionally carrying the server's view of the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub reason: ConflictReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_item: Option<ServerItem>,
}

/// Minimal view of a server row: metadata only, never ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub file_name: String,
    pub blob_id: Option<String>,
}

/// Full view of a server row, ciphertext slots included. Used in
/// `missing_items` and in conflicts answered to `resolve=server`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: String,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub file_name: String,
    pub blob_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub login_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub login_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub password_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub password_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub text_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub text_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub card_cipher: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub card_nonce: Option<Vec<u8>>,
}

/// The server's view of a row inside a conflict: a metadata-only summary for
/// ordinary conflicts, a full snapshot when the client asked `resolve=server`.
///
/// Tagged on the wire by a `kind` field. The tag is load-bearing: a full
/// snapshot whose ciphertext slots are all empty carries the same fields as
/// a summary, so the two forms cannot be told apart by shape alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ServerItem {
    #[serde(rename = "minimal")]
    Minimal(ItemSummary),
    #[serde(rename = "full")]
    Full(Box<ItemSnapshot>),
}

impl ServerItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Minimal(s) => &s.id,
            Self::Full(s) => &s.id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Self::Minimal(s) => s.version,
            Self::Full(s) => s.version,
        }
    }

    /// The full snapshot, when present.
    pub fn snapshot(&self) -> Option<&ItemSnapshot> {
        match self {
            Self::Minimal(_) => None,
            Self::Full(s) => Some(s),
        }
    }
}

/// Response body of `POST /api/items/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub applied: Vec<Applied>,
    pub conflicts: Vec<Conflict>,
    /// Minimal views of rows with `updated_at > last_sync_at`, ascending.
    pub server_changes: Vec<ItemSummary>,
    /// Full snapshots of rows the request did not mention; only populated
    /// when the request set `want_missing`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_items: Vec<ItemSnapshot>,
    /// Server clock at the end of processing; the client persists this as
    /// its next watermark.
    pub server_time: DateTime<Utc>,
}

/// Response body of `POST /api/blobs/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub created: bool,
    pub size: usize,
}

/// Credentials for register/login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Body of `POST /api/user/test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub result: String,
}

/// Base64 (de)serialization for optional byte slots.
pub(crate) mod opt_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let value: Option<String> = Option::deserialize(d)?;
        match value {
            None => Ok(None),
            Some(text) => STANDARD
                .decode(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
