//! HTTP client for the lockbox server.
//!
//! The auth token is passed explicitly as the `auth_token` cookie on every
//! authenticated call; register/login capture it from the `Set-Cookie`
//! response header.

use crate::store::Blob;
use crate::sync::models::{Credentials, StatusResponse, SyncRequest, SyncResponse, UploadResponse};
use crate::{LockboxError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const AUTH_COOKIE: &str = "auth_token";

/// HTTP client bound to one server base URL.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (scheme included, no trailing slash).
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Register a new account. Returns the issued auth token.
    pub async fn register(&self, login: &str, password: &str) -> Result<String> {
        self.authenticate("/api/user/register", login, password)
            .await
    }

    /// Log in to an existing account. Returns the issued auth token.
    pub async fn login(&self, login: &str, password: &str) -> Result<String> {
        self.authenticate("/api/user/login", login, password).await
    }

    /// Ask the server who we are. Works with or without a token.
    pub async fn status(&self, token: Option<&str>) -> Result<String> {
        let url = format!("{}/api/user/test", self.base_url);
        let mut req = self.http.post(&url);
        if let Some(token) = token {
            req = req.header("Cookie", format!("{}={}", AUTH_COOKIE, token));
        }
        let resp = req.send().await?;
        let resp = check_status(resp).await?;
        let body: StatusResponse = resp.json().await?;
        Ok(body.result)
    }

    /// Run one sync batch against `/api/items/sync`.
    pub async fn sync(&self, token: &str, request: &SyncRequest) -> Result<SyncResponse> {
        let url = format!("{}/api/items/sync", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("Cookie", format!("{}={}", AUTH_COOKIE, token))
            .json(request)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Upload a blob out-of-band as multipart form data: `id` (text),
    /// `nonce` (base64 text), `cipher` (file part, raw bytes).
    pub async fn upload_blob(&self, token: &str, blob: &Blob) -> Result<UploadResponse> {
        if blob.id.is_empty() || blob.cipher.is_empty() || blob.nonce.is_empty() {
            return Err(LockboxError::InvalidInput(
                "blob id, cipher and nonce are required".into(),
            ));
        }
        let url = format!("{}/api/blobs/upload", self.base_url);
        let form = reqwest::multipart::Form::new()
            .text("id", blob.id.clone())
            .text("nonce", BASE64.encode(&blob.nonce))
            .part(
                "cipher",
                reqwest::multipart::Part::bytes(blob.cipher.clone()).file_name("cipher.bin"),
            );

        let resp = self
            .http
            .post(&url)
            .header("Cookie", format!("{}={}", AUTH_COOKIE, token))
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    // --- Internal helpers ---

    async fn authenticate(&self, path: &str, login: &str, password: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(&Credentials {
                login: login.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        let resp = check_status(resp).await?;
        extract_auth_cookie(resp.headers()).ok_or_else(|| LockboxError::Server {
            status: 200,
            message: "no auth cookie in response".into(),
        })
    }
}

/// Pull the `auth_token` cookie value out of `Set-Cookie` headers.
fn extract_auth_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    for value in headers.get_all(reqwest::header::SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let pair = raw.split(';').next().unwrap_or("");
        if let Some((name, value)) = pair.split_once('=') {
            if name.trim() == AUTH_COOKIE && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Map non-2xx responses to [`LockboxError::Server`] with the body text.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(LockboxError::Server {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}
