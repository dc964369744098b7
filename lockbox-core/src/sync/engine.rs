//! Client-side sync orchestrator.
//!
//! Builds change sets from the local store, runs them through the server's
//! reconciler, and persists the outcome: applied versions, server snapshots
//! taken under `resolve=server`, full snapshots of items this replica has
//! never seen, and the `server_time` watermark. Blob uploads run
//! concurrently with the metadata sync on a separate connection.

use crate::session::Session;
use crate::store::{Item, ItemStore};
use crate::sync::client::ApiClient;
use crate::sync::models::{
    Conflict, ItemChange, ItemSnapshot, ItemSummary, ResolvePolicy, SyncRequest, UploadResponse,
    EPOCH_RFC3339,
};
use crate::{LockboxError, Result};
use chrono::SecondsFormat;
use tokio::sync::oneshot;

/// Receipt delivered once an asynchronous blob upload finishes.
pub type UploadReceipt = UploadResponse;

/// Outcome of a single-item sync.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Whether the change was applied on the server.
    pub applied: bool,
    /// The new server version when applied.
    pub new_version: i64,
    /// The server's version of the row when it reported a conflict; `0`
    /// when the conflict carried no server view.
    pub server_version: i64,
    pub conflicts: Vec<Conflict>,
}

/// Options for a batch sync.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Sync from the epoch and ask for items this replica lacks.
    pub all: bool,
    /// Resolution applied to every conflicting change in the batch.
    pub resolve: Option<ResolvePolicy>,
}

/// Summary of a batch sync.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub applied_count: usize,
    /// Items overwritten locally from server snapshots.
    pub server_upserts: usize,
    pub conflicts: Vec<Conflict>,
    /// Server-side changes since the watermark (minimal views, not stored).
    pub server_changes: Vec<ItemSummary>,
    /// Blob ids newly queued for download during this run.
    pub queued_blob_ids: Vec<String>,
    /// The watermark persisted after this run.
    pub server_time: Option<String>,
}

/// Orchestrates sync flows for one user.
pub struct SyncEngine<'a> {
    client: &'a ApiClient,
    store: &'a ItemStore,
    session: &'a Session,
}

impl<'a> SyncEngine<'a> {
    pub fn new(client: &'a ApiClient, store: &'a ItemStore, session: &'a Session) -> Self {
        Self {
            client,
            store,
            session,
        }
    }

    /// Sync a single item by name.
    ///
    /// On `applied`, the returned server version is persisted locally. On a
    /// conflict with `resolve=server`, any full snapshot in the response
    /// overwrites the local row and missing blobs are queued for download.
    pub async fn sync_item(
        &self,
        token: &str,
        name: &str,
        resolve: Option<ResolvePolicy>,
    ) -> Result<SyncOutcome> {
        let item = self.store.get_item_by_name(name)?;
        let request = SyncRequest {
            last_sync_at: None,
            want_missing: false,
            changes: vec![change_from_item(&item, resolve)],
        };
        let response = self.client.sync(token, &request).await?;

        if let Some(applied) = response.applied.first() {
            // Server truth: the change is applied even if the local version
            // write fails, so surface that failure as a distinct error.
            self.store
                .set_server_version(&applied.id, applied.new_version)
                .map_err(|source| LockboxError::PersistVersion {
                    id: applied.id.clone(),
                    new_version: applied.new_version,
                    source,
                })?;
            return Ok(SyncOutcome {
                applied: true,
                new_version: applied.new_version,
                server_version: 0,
                conflicts: vec![],
            });
        }

        let server_version = response
            .conflicts
            .first()
            .and_then(|c| c.server_item.as_ref())
            .map(|s| s.version())
            .unwrap_or(0);

        if resolve == Some(ResolvePolicy::Server) {
            let mut queued = Vec::new();
            for conflict in &response.conflicts {
                if let Some(snapshot) = conflict.server_item.as_ref().and_then(|s| s.snapshot()) {
                    self.apply_snapshot(snapshot, &mut queued)?;
                }
            }
        }

        Ok(SyncOutcome {
            applied: false,
            new_version: 0,
            server_version,
            conflicts: response.conflicts,
        })
    }

    /// Sync every local item in one batch.
    pub async fn sync_batch(&self, token: &str, opts: &BatchOptions) -> Result<BatchSummary> {
        let login = self.session.load_login()?;
        let last_sync_at = if opts.all {
            EPOCH_RFC3339.to_string()
        } else {
            self.session
                .load_last_sync_at(&login)
                .unwrap_or_else(|| EPOCH_RFC3339.to_string())
        };

        let items = self.store.list_items()?;
        let request = SyncRequest {
            last_sync_at: Some(last_sync_at),
            want_missing: opts.all,
            changes: items
                .iter()
                .map(|it| change_from_item(it, opts.resolve))
                .collect(),
        };
        let response = self.client.sync(token, &request).await?;

        let mut summary = BatchSummary {
            applied_count: response.applied.len(),
            ..Default::default()
        };
        let mut queued = Vec::new();

        for applied in &response.applied {
            if let Err(e) = self
                .store
                .set_server_version(&applied.id, applied.new_version)
            {
                tracing::warn!(
                    id = %applied.id,
                    version = applied.new_version,
                    error = %e,
                    "failed to persist applied version; will reconcile on next sync"
                );
            }
        }

        if opts.resolve == Some(ResolvePolicy::Server) {
            for conflict in &response.conflicts {
                let Some(snapshot) = conflict.server_item.as_ref().and_then(|s| s.snapshot())
                else {
                    continue;
                };
                if let Err(e) = self.apply_snapshot(snapshot, &mut queued) {
                    tracing::warn!(id = %conflict.id, error = %e, "failed to apply server snapshot");
                }
            }
        }

        for snapshot in &response.missing_items {
            match self.apply_snapshot(snapshot, &mut queued) {
                Ok(()) => summary.server_upserts += 1,
                Err(e) => {
                    tracing::warn!(id = %snapshot.id, error = %e, "failed to apply missing item")
                }
            }
        }

        let server_time = response
            .server_time
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        self.session.save_last_sync_at(&login, &server_time)?;

        summary.server_time = Some(server_time);
        summary.conflicts = response.conflicts;
        summary.server_changes = response.server_changes;
        summary.queued_blob_ids = queued;
        Ok(summary)
    }

    /// Start uploading a stored blob on a separate connection.
    ///
    /// The upload runs concurrently with whatever the caller does next
    /// (typically the metadata sync); exactly one receipt arrives on the
    /// returned channel.
    pub fn spawn_blob_upload(
        &self,
        token: &str,
        blob_id: &str,
    ) -> Result<oneshot::Receiver<Result<UploadReceipt>>> {
        let blob = self.store.get_blob_by_id(blob_id)?;
        let client = self.client.clone();
        let token = token.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = client.upload_blob(&token, &blob).await;
            // The receiver may have gone away on cancellation.
            let _ = tx.send(result);
        });

        Ok(rx)
    }

    /// Overwrite a local row with a server snapshot, align its version, and
    /// queue its blob for download when it is not present locally.
    fn apply_snapshot(&self, snapshot: &ItemSnapshot, queued: &mut Vec<String>) -> Result<()> {
        let item = snapshot_to_local(snapshot);
        self.store.upsert_full_from_server(&item)?;
        self.store.set_server_version(&item.id, item.version)?;

        if !item.blob_id.is_empty()
            && !self.store.has_blob(&item.blob_id)?
            && self.store.enqueue_download(&item.blob_id)?
        {
            queued.push(item.blob_id.clone());
        }
        Ok(())
    }
}

/// Build the wire change for a local item: its version (0 when never
/// synced), scalar fields when set, and every populated cipher pair.
pub fn change_from_item(item: &Item, resolve: Option<ResolvePolicy>) -> ItemChange {
    let pair = |cipher: &Option<Vec<u8>>, nonce: &Option<Vec<u8>>| {
        if Item::has_pair(cipher, nonce) {
            (cipher.clone(), nonce.clone())
        } else {
            (None, None)
        }
    };
    let (login_cipher, login_nonce) = pair(&item.login_cipher, &item.login_nonce);
    let (password_cipher, password_nonce) = pair(&item.password_cipher, &item.password_nonce);
    let (text_cipher, text_nonce) = pair(&item.text_cipher, &item.text_nonce);
    let (card_cipher, card_nonce) = pair(&item.card_cipher, &item.card_nonce);

    ItemChange {
        id: item.id.clone(),
        version: Some(item.version),
        deleted: None,
        resolve,
        name: (!item.name.is_empty()).then(|| item.name.clone()),
        file_name: (!item.file_name.is_empty()).then(|| item.file_name.clone()),
        blob_id: (!item.blob_id.is_empty()).then(|| item.blob_id.clone()),
        login_cipher,
        login_nonce,
        password_cipher,
        password_nonce,
        text_cipher,
        text_nonce,
        card_cipher,
        card_nonce,
    }
}

/// Convert a full server snapshot into a local store row.
pub fn snapshot_to_local(snapshot: &ItemSnapshot) -> Item {
    let at = snapshot.updated_at.timestamp();
    Item {
        id: snapshot.id.clone(),
        name: snapshot.name.clone(),
        created_at: at,
        updated_at: at,
        version: snapshot.version,
        deleted: snapshot.deleted,
        file_name: snapshot.file_name.clone(),
        blob_id: snapshot.blob_id.clone().unwrap_or_default(),
        login_cipher: snapshot.login_cipher.clone(),
        login_nonce: snapshot.login_nonce.clone(),
        password_cipher: snapshot.password_cipher.clone(),
        password_nonce: snapshot.password_nonce.clone(),
        text_cipher: snapshot.text_cipher.clone(),
        text_nonce: snapshot.text_nonce.clone(),
        card_cipher: snapshot.card_cipher.clone(),
        card_nonce: snapshot.card_nonce.clone(),
    }
}
