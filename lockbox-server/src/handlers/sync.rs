//! The sync endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::Extensions;
use axum::Json;

use lockbox_core::sync::models::{SyncRequest, SyncResponse};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::reconcile;
use crate::server::AppState;

/// `POST /api/items/sync`: run one reconciliation batch.
///
/// Per-item failures come back inside the response as conflicts; only a
/// missing session or an unparsable body reject the request itself.
pub async fn sync(
    State(state): State<AppState>,
    extensions: Extensions,
    body: Bytes,
) -> Result<Json<SyncResponse>, ApiError> {
    let AuthUser(user_id) = *extensions.get::<AuthUser>().ok_or(ApiError::Unauthorized)?;

    let request: SyncRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request: {}", e)))?;

    tracing::debug!(
        user_id,
        changes = request.changes.len(),
        want_missing = request.want_missing,
        "sync request"
    );

    let response = reconcile::reconcile(&state.storage, user_id, &request);

    tracing::info!(
        user_id,
        applied = response.applied.len(),
        conflicts = response.conflicts.len(),
        server_changes = response.server_changes.len(),
        missing = response.missing_items.len(),
        "sync processed"
    );

    Ok(Json(response))
}
