//! Account handlers: register, login, and the status probe.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::Extensions;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;

use lockbox_core::sync::models::{Credentials, StatusResponse};

use crate::auth::{auth_cookie, issue_token, AuthUser};
use crate::error::ApiError;
use crate::server::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&creds)?;
    let user_id = state.storage.create_user(&creds.login, &creds.password)?;
    tracing::info!(user_id, login = %creds.login, "registered user");
    Ok(with_auth_cookie(&state, user_id))
}

pub async fn login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&creds)?;
    let user_id = state
        .storage
        .verify_user(&creds.login, &creds.password)?
        .ok_or(ApiError::Unauthorized)?;
    tracing::info!(user_id, login = %creds.login, "user logged in");
    Ok(with_auth_cookie(&state, user_id))
}

/// Status probe: reports the authenticated user id, or `anonymous`.
pub async fn status(extensions: Extensions) -> Json<StatusResponse> {
    let result = match extensions.get::<AuthUser>() {
        Some(AuthUser(user_id)) => format!("User ID = {}", user_id),
        None => "anonymous".to_string(),
    };
    Json(StatusResponse { result })
}

fn validate(creds: &Credentials) -> Result<(), ApiError> {
    if creds.login.is_empty() || creds.password.is_empty() {
        return Err(ApiError::BadRequest(
            "login and password are required".into(),
        ));
    }
    Ok(())
}

fn with_auth_cookie(state: &AppState, user_id: i64) -> impl IntoResponse {
    let token = issue_token(&state.config.auth_secret, user_id);
    (
        AppendHeaders([(SET_COOKIE, auth_cookie(&token))]),
        Json(serde_json::json!({ "result": "ok" })),
    )
}
