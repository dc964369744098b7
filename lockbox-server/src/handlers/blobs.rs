//! Blob upload handler.
//!
//! Multipart form with three parts: `id` (text), `nonce` (base64 text) and
//! `cipher` (file part, raw bytes). Storage is idempotent per id: 201 when
//! the blob was stored by this request, 200 when the id already existed.

use axum::extract::{Multipart, State};
use axum::http::{Extensions, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use lockbox_core::sync::models::UploadResponse;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

pub async fn upload(
    State(state): State<AppState>,
    extensions: Extensions,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let AuthUser(user_id) = *extensions.get::<AuthUser>().ok_or(ApiError::Unauthorized)?;

    let mut id: Option<String> = None;
    let mut nonce: Option<Vec<u8>> = None;
    let mut cipher: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart form: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid id field: {}", e)))?;
                id = Some(value);
            }
            "nonce" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid nonce field: {}", e)))?;
                let decoded = BASE64
                    .decode(value.as_bytes())
                    .map_err(|_| ApiError::BadRequest("invalid nonce (base64)".into()))?;
                nonce = Some(decoded);
            }
            "cipher" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read cipher: {}", e)))?;
                cipher = Some(bytes.to_vec());
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown upload field");
            }
        }
    }

    let id = id.filter(|v| !v.is_empty()).ok_or_else(|| {
        ApiError::BadRequest("missing id".into())
    })?;
    let nonce = nonce
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing nonce".into()))?;
    let cipher = cipher
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing cipher file".into()))?;

    let max_cipher = state.config.max_cipher_bytes();
    if cipher.len() > max_cipher {
        tracing::warn!(user_id, %id, size = cipher.len(), limit = max_cipher, "blob too large");
        return Err(ApiError::PayloadTooLarge);
    }

    let size = cipher.len();
    let created = state.storage.create_blob_if_absent(&id, &cipher, &nonce)?;

    tracing::info!(user_id, %id, size, created, "blob upload");

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(UploadResponse { id, created, size })))
}
