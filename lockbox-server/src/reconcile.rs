//! The sync reconciler.
//!
//! Validates each incoming change against the authoritative store and
//! applies or rejects it under the optimistic-concurrency version rule.
//! A conflict is a first-class response element, never an error: one bad
//! change cannot abort the batch, and per-item store failures degrade to
//! `internal_error` conflicts.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use lockbox_core::sync::models::{
    Applied, Conflict, ConflictReason, ItemChange, ItemSnapshot, ItemSummary, ResolvePolicy,
    ServerItem, SyncRequest, SyncResponse,
};

use crate::storage::{now_micros, ItemPatch, ItemRow, Storage};

/// Process one sync batch for `user_id`.
pub fn reconcile(storage: &Storage, user_id: i64, request: &SyncRequest) -> SyncResponse {
    let mut applied = Vec::new();
    let mut conflicts = Vec::new();

    for change in &request.changes {
        match reconcile_one(storage, user_id, change) {
            Outcome::Applied(a) => applied.push(a),
            Outcome::Conflict(c) => conflicts.push(c),
        }
    }

    let server_changes = collect_server_changes(storage, user_id, request.last_sync_at.as_deref());
    let missing_items = if request.want_missing {
        collect_missing(storage, user_id, &request.changes)
    } else {
        Vec::new()
    };

    SyncResponse {
        applied,
        conflicts,
        server_changes,
        missing_items,
        // The clock at the end of processing; clients persist this as their
        // next watermark.
        server_time: micros_to_datetime(now_micros()),
    }
}

enum Outcome {
    Applied(Applied),
    Conflict(Conflict),
}

fn reconcile_one(storage: &Storage, user_id: i64, change: &ItemChange) -> Outcome {
    let current = match storage.get_by_id(user_id, &change.id) {
        Ok(current) => current,
        Err(e) => {
            tracing::error!(user_id, item_id = %change.id, error = %e, "sync: item read failed");
            return internal_error(change);
        }
    };

    let Some(current) = current else {
        // Creation is only allowed for a change that claims version 0.
        if change.version == Some(0) {
            let row = row_from_change(user_id, change);
            return match storage.create(&row) {
                Ok(()) => Outcome::Applied(Applied {
                    id: change.id.clone(),
                    new_version: 1,
                }),
                Err(e) => {
                    tracing::error!(user_id, item_id = %change.id, error = %e, "sync: create failed");
                    internal_error(change)
                }
            };
        }
        return Outcome::Conflict(Conflict {
            id: change.id.clone(),
            reason: ConflictReason::NotFound,
            server_item: None,
        });
    };

    // Tombstones are terminal: no change may revive a deleted row.
    if current.deleted && change.deleted == Some(false) {
        return version_conflict(change, &current);
    }

    if change.version == Some(current.version) {
        return apply_patch(storage, user_id, change, &current);
    }

    match change.resolve {
        Some(ResolvePolicy::Client) => {
            // The client copy is authoritative. The server-current version
            // becomes the CAS expectation, so the write stays atomic
            // relative to any third writer.
            apply_patch(storage, user_id, change, &current)
        }
        Some(ResolvePolicy::Server) => Outcome::Conflict(Conflict {
            id: change.id.clone(),
            reason: ConflictReason::VersionConflict,
            // resolve=server consumers overwrite their local copy, so they
            // get the full snapshot, ciphertext included.
            server_item: Some(ServerItem::Full(Box::new(full_view(&current)))),
        }),
        None => {
            if only_fills_empty(change, &current) {
                apply_patch(storage, user_id, change, &current)
            } else {
                version_conflict(change, &current)
            }
        }
    }
}

fn apply_patch(storage: &Storage, user_id: i64, change: &ItemChange, current: &ItemRow) -> Outcome {
    let patch = patch_from_change(change);
    match storage.update_with_version(user_id, &change.id, current.version, &patch) {
        Ok(Some(new_version)) => Outcome::Applied(Applied {
            id: change.id.clone(),
            new_version,
        }),
        Ok(None) => {
            // The row moved between our read and the CAS write.
            tracing::warn!(user_id, item_id = %change.id, expected = current.version,
                "sync: versioned update matched no row");
            internal_error(change)
        }
        Err(e) => {
            tracing::error!(user_id, item_id = %change.id, error = %e, "sync: update failed");
            internal_error(change)
        }
    }
}

fn internal_error(change: &ItemChange) -> Outcome {
    Outcome::Conflict(Conflict {
        id: change.id.clone(),
        reason: ConflictReason::InternalError,
        server_item: None,
    })
}

fn version_conflict(change: &ItemChange, current: &ItemRow) -> Outcome {
    Outcome::Conflict(Conflict {
        id: change.id.clone(),
        reason: ConflictReason::VersionConflict,
        server_item: Some(ServerItem::Minimal(minimal_view(current))),
    })
}

/// The auto-fill rule: a stale-version update is safe if and only if every
/// field the client sent would land in a slot that is currently empty.
fn only_fills_empty(change: &ItemChange, current: &ItemRow) -> bool {
    if change.name.is_some() && !current.name.is_empty() {
        return false;
    }
    if change.file_name.is_some() && !current.file_name.is_empty() {
        return false;
    }
    if change.blob_id.is_some() && current.blob_id.as_deref().is_some_and(|b| !b.is_empty()) {
        return false;
    }
    let slots = [
        (&change.login_cipher, &current.login_cipher),
        (&change.login_nonce, &current.login_nonce),
        (&change.password_cipher, &current.password_cipher),
        (&change.password_nonce, &current.password_nonce),
        (&change.text_cipher, &current.text_cipher),
        (&change.text_nonce, &current.text_nonce),
        (&change.card_cipher, &current.card_cipher),
        (&change.card_nonce, &current.card_nonce),
    ];
    for (sent, stored) in slots {
        if sent.is_some() && ItemRow::slot_set(stored) {
            return false;
        }
    }
    if change.deleted.is_some() && current.deleted {
        return false;
    }
    true
}

/// Build the typed patch for the fields the client actually sent.
fn patch_from_change(change: &ItemChange) -> ItemPatch {
    ItemPatch {
        name: change.name.clone(),
        file_name: change.file_name.clone(),
        // Empty string clears the reference to null.
        blob_id: change
            .blob_id
            .as_ref()
            .map(|b| (!b.is_empty()).then(|| b.clone())),
        deleted: change.deleted,
        login_cipher: change.login_cipher.clone(),
        login_nonce: change.login_nonce.clone(),
        password_cipher: change.password_cipher.clone(),
        password_nonce: change.password_nonce.clone(),
        text_cipher: change.text_cipher.clone(),
        text_nonce: change.text_nonce.clone(),
        card_cipher: change.card_cipher.clone(),
        card_nonce: change.card_nonce.clone(),
    }
}

/// Materialize a brand-new row from a version-0 change.
fn row_from_change(user_id: i64, change: &ItemChange) -> ItemRow {
    let now = now_micros();
    let slot = |v: &Option<Vec<u8>>| v.clone().filter(|b| !b.is_empty());
    ItemRow {
        id: change.id.clone(),
        user_id,
        name: change.name.clone().unwrap_or_default(),
        file_name: change.file_name.clone().unwrap_or_default(),
        blob_id: change.blob_id.clone().filter(|b| !b.is_empty()),
        version: 1,
        deleted: change.deleted.unwrap_or(false),
        login_cipher: slot(&change.login_cipher),
        login_nonce: slot(&change.login_nonce),
        password_cipher: slot(&change.password_cipher),
        password_nonce: slot(&change.password_nonce),
        text_cipher: slot(&change.text_cipher),
        text_nonce: slot(&change.text_nonce),
        card_cipher: slot(&change.card_cipher),
        card_nonce: slot(&change.card_nonce),
        created_at: now,
        updated_at: now,
    }
}

fn collect_server_changes(
    storage: &Storage,
    user_id: i64,
    last_sync_at: Option<&str>,
) -> Vec<ItemSummary> {
    let Some(raw) = last_sync_at else {
        return Vec::new();
    };
    let Ok(since) = DateTime::parse_from_rfc3339(raw) else {
        // A malformed watermark is ignored, not an error.
        tracing::warn!(user_id, value = raw, "sync: invalid last_sync_at");
        return Vec::new();
    };
    let since_micros = since.with_timezone(&Utc).timestamp_micros();
    match storage.get_items_updated_since(user_id, since_micros) {
        Ok(rows) => rows.iter().map(minimal_view).collect(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "sync: get items since failed");
            Vec::new()
        }
    }
}

fn collect_missing(storage: &Storage, user_id: i64, changes: &[ItemChange]) -> Vec<ItemSnapshot> {
    let mentioned: HashSet<&str> = changes.iter().map(|c| c.id.as_str()).collect();
    match storage.list_all(user_id) {
        Ok(rows) => rows
            .iter()
            .filter(|row| !mentioned.contains(row.id.as_str()))
            .map(full_view)
            .collect(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "sync: list items failed");
            Vec::new()
        }
    }
}

/// Metadata-only view, never ciphertext.
fn minimal_view(row: &ItemRow) -> ItemSummary {
    ItemSummary {
        id: row.id.clone(),
        version: row.version,
        deleted: row.deleted,
        updated_at: micros_to_datetime(row.updated_at),
        name: row.name.clone(),
        file_name: row.file_name.clone(),
        blob_id: row.blob_id.clone().filter(|b| !b.is_empty()),
    }
}

/// Full snapshot including every populated ciphertext slot.
fn full_view(row: &ItemRow) -> ItemSnapshot {
    let slot = |v: &Option<Vec<u8>>| v.clone().filter(|b| !b.is_empty());
    ItemSnapshot {
        id: row.id.clone(),
        version: row.version,
        deleted: row.deleted,
        updated_at: micros_to_datetime(row.updated_at),
        name: row.name.clone(),
        file_name: row.file_name.clone(),
        blob_id: row.blob_id.clone().filter(|b| !b.is_empty()),
        login_cipher: slot(&row.login_cipher),
        login_nonce: slot(&row.login_nonce),
        password_cipher: slot(&row.password_cipher),
        password_nonce: slot(&row.password_nonce),
        text_cipher: slot(&row.text_cipher),
        text_nonce: slot(&row.text_nonce),
        card_cipher: slot(&row.card_cipher),
        card_nonce: slot(&row.card_nonce),
    }
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_core::sync::models::EPOCH_RFC3339;

    fn setup() -> (Storage, i64) {
        let storage = Storage::in_memory().unwrap();
        let user_id = storage.create_user("alice", "pw").unwrap();
        (storage, user_id)
    }

    fn change(id: &str, version: i64) -> ItemChange {
        ItemChange {
            id: id.to_string(),
            version: Some(version),
            ..Default::default()
        }
    }

    fn run(storage: &Storage, user_id: i64, changes: Vec<ItemChange>) -> SyncResponse {
        reconcile(
            storage,
            user_id,
            &SyncRequest {
                last_sync_at: None,
                want_missing: false,
                changes,
            },
        )
    }

    #[test]
    fn creates_at_version_one() {
        let (storage, user_id) = setup();
        let mut c = change("note1", 0);
        c.name = Some("note1".into());
        c.text_cipher = Some(vec![0x01]);
        c.text_nonce = Some(vec![0x02]);

        let resp = run(&storage, user_id, vec![c]);
        assert_eq!(
            resp.applied,
            vec![Applied {
                id: "note1".into(),
                new_version: 1
            }]
        );
        assert!(resp.conflicts.is_empty());

        let row = storage.get_by_id(user_id, "note1").unwrap().unwrap();
        assert_eq!(row.version, 1);
        assert_eq!(row.text_cipher, Some(vec![0x01]));
        assert!(!row.deleted);
    }

    #[test]
    fn update_of_absent_row_is_not_found() {
        let (storage, user_id) = setup();
        let resp = run(&storage, user_id, vec![change("ghost", 3)]);
        assert!(resp.applied.is_empty());
        assert_eq!(resp.conflicts[0].reason, ConflictReason::NotFound);
        assert!(resp.conflicts[0].server_item.is_none());
    }

    #[test]
    fn absent_version_on_absent_row_is_not_found() {
        let (storage, user_id) = setup();
        let c = ItemChange {
            id: "ghost".into(),
            ..Default::default()
        };
        let resp = run(&storage, user_id, vec![c]);
        assert_eq!(resp.conflicts[0].reason, ConflictReason::NotFound);
    }

    #[test]
    fn matched_version_applies_patch() {
        let (storage, user_id) = setup();
        let mut create = change("note1", 0);
        create.text_cipher = Some(vec![1]);
        create.text_nonce = Some(vec![2]);
        run(&storage, user_id, vec![create]);

        // Same version, disjoint field.
        let mut update = change("note1", 1);
        update.login_cipher = Some(vec![3]);
        update.login_nonce = Some(vec![4]);
        let resp = run(&storage, user_id, vec![update]);
        assert_eq!(resp.applied[0].new_version, 2);

        let row = storage.get_by_id(user_id, "note1").unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.text_cipher, Some(vec![1]));
        assert_eq!(row.login_cipher, Some(vec![3]));
    }

    #[test]
    fn applied_bump_rewrites_updated_at() {
        let (storage, user_id) = setup();
        run(&storage, user_id, vec![change("a", 0)]);
        let before = storage.get_by_id(user_id, "a").unwrap().unwrap();

        run(&storage, user_id, vec![change("a", 1)]);
        let after = storage.get_by_id(user_id, "a").unwrap().unwrap();
        assert_eq!(after.version, 2);
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn stale_version_overlapping_field_conflicts_without_mutation() {
        let (storage, user_id) = setup();
        let mut create = change("note1", 0);
        create.text_cipher = Some(vec![1]);
        create.text_nonce = Some(vec![2]);
        run(&storage, user_id, vec![create]);
        run(&storage, user_id, vec![change("note1", 1)]); // now v2

        let mut stale = change("note1", 1);
        stale.text_cipher = Some(vec![9]);
        stale.text_nonce = Some(vec![9]);
        let resp = run(&storage, user_id, vec![stale]);

        let conflict = &resp.conflicts[0];
        assert_eq!(conflict.reason, ConflictReason::VersionConflict);
        let server_item = conflict.server_item.as_ref().unwrap();
        assert_eq!(server_item.version(), 2);
        // Default policy carries the minimal view only.
        assert!(server_item.snapshot().is_none());

        let row = storage.get_by_id(user_id, "note1").unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.text_cipher, Some(vec![1]));
    }

    #[test]
    fn stale_version_disjoint_fields_auto_fill() {
        let (storage, user_id) = setup();
        let mut create = change("note1", 0);
        create.text_cipher = Some(vec![1]);
        create.text_nonce = Some(vec![2]);
        run(&storage, user_id, vec![create]);
        run(&storage, user_id, vec![change("note1", 1)]); // now v2

        // Claims v1, but only writes slots that are empty on the server.
        let mut stale = change("note1", 1);
        stale.login_cipher = Some(vec![5]);
        stale.login_nonce = Some(vec![6]);
        let resp = run(&storage, user_id, vec![stale]);
        assert_eq!(resp.applied[0].new_version, 3);

        let row = storage.get_by_id(user_id, "note1").unwrap().unwrap();
        assert_eq!(row.login_cipher, Some(vec![5]));
        assert_eq!(row.text_cipher, Some(vec![1]));
    }

    #[test]
    fn resolve_client_forces_the_write() {
        let (storage, user_id) = setup();
        let mut create = change("note1", 0);
        create.text_cipher = Some(vec![1]);
        create.text_nonce = Some(vec![2]);
        run(&storage, user_id, vec![create]);
        run(&storage, user_id, vec![change("note1", 1)]); // now v2

        let mut forced = change("note1", 1);
        forced.resolve = Some(ResolvePolicy::Client);
        forced.text_cipher = Some(vec![7]);
        forced.text_nonce = Some(vec![8]);
        let resp = run(&storage, user_id, vec![forced]);

        // New version is server-current + 1 regardless of the claimed one.
        assert_eq!(resp.applied[0].new_version, 3);
        let row = storage.get_by_id(user_id, "note1").unwrap().unwrap();
        assert_eq!(row.text_cipher, Some(vec![7]));
    }

    #[test]
    fn resolve_server_returns_full_snapshot_and_never_mutates() {
        let (storage, user_id) = setup();
        let mut create = change("doc", 0);
        create.name = Some("doc".into());
        create.blob_id = Some("B7".into());
        create.text_cipher = Some(vec![1]);
        create.text_nonce = Some(vec![2]);
        run(&storage, user_id, vec![create]);
        run(&storage, user_id, vec![change("doc", 1)]); // now v2

        let mut mine = change("doc", 1);
        mine.resolve = Some(ResolvePolicy::Server);
        mine.text_cipher = Some(vec![9]);
        mine.text_nonce = Some(vec![9]);
        let resp = run(&storage, user_id, vec![mine]);

        let conflict = &resp.conflicts[0];
        assert_eq!(conflict.reason, ConflictReason::VersionConflict);
        let snapshot = conflict
            .server_item
            .as_ref()
            .and_then(|s| s.snapshot())
            .expect("full snapshot under resolve=server");
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.blob_id.as_deref(), Some("B7"));
        assert_eq!(snapshot.text_cipher, Some(vec![1]));

        let row = storage.get_by_id(user_id, "doc").unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.text_cipher, Some(vec![1]));
    }

    #[test]
    fn resolve_server_snapshot_survives_the_wire_without_cipher_slots() {
        let (storage, user_id) = setup();
        // A blob-only row: no ciphertext slot is ever populated.
        let mut create = change("doc", 0);
        create.name = Some("doc".into());
        create.file_name = Some("report.pdf".into());
        create.blob_id = Some("B7".into());
        run(&storage, user_id, vec![create]);
        run(&storage, user_id, vec![change("doc", 1)]); // now v2

        let mut mine = change("doc", 1);
        mine.resolve = Some(ResolvePolicy::Server);
        let resp = run(&storage, user_id, vec![mine]);

        // Round-trip through the wire encoding: the full form must still be
        // recognizable even though its field shape matches a summary.
        let json = serde_json::to_string(&resp).unwrap();
        let back: SyncResponse = serde_json::from_str(&json).unwrap();

        let conflict = &back.conflicts[0];
        assert_eq!(conflict.reason, ConflictReason::VersionConflict);
        let snapshot = conflict
            .server_item
            .as_ref()
            .and_then(|s| s.snapshot())
            .expect("full snapshot for a cipher-empty row");
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.blob_id.as_deref(), Some("B7"));
        assert_eq!(snapshot.file_name, "report.pdf");
        assert!(snapshot.text_cipher.is_none());
    }

    #[test]
    fn missing_items_survive_the_wire_without_cipher_slots() {
        let (storage, user_id) = setup();
        let mut create = change("doc", 0);
        create.blob_id = Some("B7".into());
        run(&storage, user_id, vec![create]);

        let resp = reconcile(
            &storage,
            user_id,
            &SyncRequest {
                last_sync_at: Some(EPOCH_RFC3339.into()),
                want_missing: true,
                changes: vec![],
            },
        );
        let json = serde_json::to_string(&resp).unwrap();
        let back: SyncResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(back.missing_items.len(), 1);
        let snap = &back.missing_items[0];
        assert_eq!(snap.id, "doc");
        assert_eq!(snap.version, 1);
        assert_eq!(snap.blob_id.as_deref(), Some("B7"));
        assert!(snap.login_cipher.is_none());
    }

    #[test]
    fn tombstone_applies_and_cannot_be_revived() {
        let (storage, user_id) = setup();
        run(&storage, user_id, vec![change("gone", 0)]);

        let mut delete = change("gone", 1);
        delete.deleted = Some(true);
        let resp = run(&storage, user_id, vec![delete]);
        assert_eq!(resp.applied[0].new_version, 2);
        assert!(storage.get_by_id(user_id, "gone").unwrap().unwrap().deleted);

        // Reviving is rejected even with a matching version.
        let mut revive = change("gone", 2);
        revive.deleted = Some(false);
        let resp = run(&storage, user_id, vec![revive]);
        assert_eq!(resp.conflicts[0].reason, ConflictReason::VersionConflict);
        assert!(storage.get_by_id(user_id, "gone").unwrap().unwrap().deleted);

        // Nor through resolve=client.
        let mut revive = change("gone", 2);
        revive.deleted = Some(false);
        revive.resolve = Some(ResolvePolicy::Client);
        let resp = run(&storage, user_id, vec![revive]);
        assert_eq!(resp.conflicts[0].reason, ConflictReason::VersionConflict);
        assert!(storage.get_by_id(user_id, "gone").unwrap().unwrap().deleted);
    }

    #[test]
    fn auto_fill_rejects_delete_of_tombstoned_row() {
        let (storage, user_id) = setup();
        run(&storage, user_id, vec![change("gone", 0)]);
        let mut delete = change("gone", 1);
        delete.deleted = Some(true);
        run(&storage, user_id, vec![delete]);

        // Stale change re-sending deleted=true: target slot is not empty.
        let mut again = change("gone", 1);
        again.deleted = Some(true);
        let resp = run(&storage, user_id, vec![again]);
        assert_eq!(resp.conflicts[0].reason, ConflictReason::VersionConflict);
    }

    #[test]
    fn blob_id_empty_string_clears() {
        let (storage, user_id) = setup();
        let mut create = change("doc", 0);
        create.blob_id = Some("B1".into());
        run(&storage, user_id, vec![create]);

        let mut clear = change("doc", 1);
        clear.blob_id = Some(String::new());
        run(&storage, user_id, vec![clear]);

        let row = storage.get_by_id(user_id, "doc").unwrap().unwrap();
        assert_eq!(row.blob_id, None);
    }

    #[test]
    fn one_bad_change_does_not_abort_the_batch() {
        let (storage, user_id) = setup();
        let resp = run(
            &storage,
            user_id,
            vec![change("ghost", 4), change("fresh", 0)],
        );
        assert_eq!(resp.conflicts.len(), 1);
        assert_eq!(resp.conflicts[0].id, "ghost");
        assert_eq!(resp.applied.len(), 1);
        assert_eq!(resp.applied[0].id, "fresh");
    }

    #[test]
    fn server_changes_need_a_parseable_watermark() {
        let (storage, user_id) = setup();
        run(&storage, user_id, vec![change("a", 0)]);

        // Absent.
        let resp = run(&storage, user_id, vec![]);
        assert!(resp.server_changes.is_empty());

        // Malformed: ignored, not an error.
        let resp = reconcile(
            &storage,
            user_id,
            &SyncRequest {
                last_sync_at: Some("not-a-time".into()),
                want_missing: false,
                changes: vec![],
            },
        );
        assert!(resp.server_changes.is_empty());

        // Epoch: everything, ascending, minimal views.
        let resp = reconcile(
            &storage,
            user_id,
            &SyncRequest {
                last_sync_at: Some(EPOCH_RFC3339.into()),
                want_missing: false,
                changes: vec![],
            },
        );
        assert_eq!(resp.server_changes.len(), 1);
        assert_eq!(resp.server_changes[0].id, "a");
    }

    #[test]
    fn server_changes_watermark_is_strict() {
        let (storage, user_id) = setup();
        run(&storage, user_id, vec![change("a", 0)]);
        let row = storage.get_by_id(user_id, "a").unwrap().unwrap();
        let exact = micros_to_datetime(row.updated_at).to_rfc3339();

        let resp = reconcile(
            &storage,
            user_id,
            &SyncRequest {
                last_sync_at: Some(exact),
                want_missing: false,
                changes: vec![],
            },
        );
        assert!(resp.server_changes.is_empty());
    }

    #[test]
    fn missing_items_only_when_requested() {
        let (storage, user_id) = setup();
        let mut create = change("note1", 0);
        create.text_cipher = Some(vec![0x01]);
        create.text_nonce = Some(vec![0x02]);
        run(&storage, user_id, vec![create]);

        let resp = run(&storage, user_id, vec![]);
        assert!(resp.missing_items.is_empty());

        // A fresh replica: empty changes, epoch watermark, want_missing.
        let resp = reconcile(
            &storage,
            user_id,
            &SyncRequest {
                last_sync_at: Some(EPOCH_RFC3339.into()),
                want_missing: true,
                changes: vec![],
            },
        );
        assert_eq!(resp.missing_items.len(), 1);
        let snap = &resp.missing_items[0];
        assert_eq!(snap.id, "note1");
        assert_eq!(snap.version, 1);
        assert_eq!(snap.text_cipher, Some(vec![0x01]));

        // Ciphertext rides the wire as base64.
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["text_cipher"], "AQ==");
        assert_eq!(json["text_nonce"], "Ag==");
    }

    #[test]
    fn missing_items_exclude_mentioned_ids() {
        let (storage, user_id) = setup();
        run(&storage, user_id, vec![change("a", 0), change("b", 0)]);

        let resp = reconcile(
            &storage,
            user_id,
            &SyncRequest {
                last_sync_at: None,
                want_missing: true,
                changes: vec![change("a", 1)],
            },
        );
        assert_eq!(resp.missing_items.len(), 1);
        assert_eq!(resp.missing_items[0].id, "b");
    }

    #[test]
    fn users_never_see_each_other() {
        let (storage, alice) = setup();
        let bob = storage.create_user("bob", "pw").unwrap();
        run(&storage, alice, vec![change("secret", 0)]);

        let resp = reconcile(
            &storage,
            bob,
            &SyncRequest {
                last_sync_at: Some(EPOCH_RFC3339.into()),
                want_missing: true,
                changes: vec![],
            },
        );
        assert!(resp.missing_items.is_empty());
        assert!(resp.server_changes.is_empty());
    }
}
