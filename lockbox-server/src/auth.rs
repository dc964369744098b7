//! Signed auth tokens and the cookie middleware.
//!
//! The `auth_token` cookie carries `user_id.issued_at.signature` where the
//! signature is HMAC-SHA256 over the first two parts, keyed by
//! `AUTH_SECRET`. The middleware verifies the cookie when present and stores
//! the user id in request extensions; protected handlers reject requests
//! without one. Requests with no cookie stay anonymous.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::COOKIE;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::server::AppState;

pub const AUTH_COOKIE: &str = "auth_token";

/// Token lifetime in seconds (30 days).
const TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

/// Authenticated user id, inserted into request extensions by the
/// middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

/// Issue a signed token for `user_id`.
pub fn issue_token(secret: &str, user_id: i64) -> String {
    let issued_at = chrono::Utc::now().timestamp();
    let payload = format!("{}.{}", user_id, issued_at);
    let signature = sign(secret, &payload);
    format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature))
}

/// Verify a token and return its user id, if valid and not expired.
pub fn verify_token(secret: &str, token: &str) -> Option<i64> {
    let mut parts = token.splitn(3, '.');
    let user_id: i64 = parts.next()?.parse().ok()?;
    let issued_at: i64 = parts.next()?.parse().ok()?;
    let signature = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;

    let payload = format!("{}.{}", user_id, issued_at);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let age = chrono::Utc::now().timestamp() - issued_at;
    if !(0..=TOKEN_TTL_SECS).contains(&age) {
        return None;
    }
    Some(user_id)
}

/// The `Set-Cookie` value for a freshly issued token.
pub fn auth_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly", AUTH_COOKIE, token)
}

fn sign(secret: &str, payload: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Cookie-verifying middleware. Never rejects by itself: unauthenticated
/// requests pass through without an [`AuthUser`] extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(cookie_value);

    if let Some(token) = token {
        match verify_token(&state.config.auth_secret, &token) {
            Some(user_id) => {
                request.extensions_mut().insert(AuthUser(user_id));
            }
            None => {
                tracing::warn!("rejected invalid auth token");
            }
        }
    }

    next.run(request).await
}

/// Extract the `auth_token` value from a `Cookie` header.
fn cookie_value(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == AUTH_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}
