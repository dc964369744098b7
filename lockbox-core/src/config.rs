//! Client configuration.
//!
//! Settings come from the environment (`BASE_URL`, `ENABLE_HTTPS`,
//! `CLIENT_DB_PATH`, `TOKEN_FILE`); command-line flags override them. The
//! server address must be a bare `host:port`; anything else falls back to the
//! default.

use crate::platform;
use std::path::PathBuf;

const DEFAULT_BASE_URL: &str = "localhost:8081";

/// Optional overrides supplied by the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub https: bool,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub base_url: String,
    /// Whether to talk to the server over https.
    pub enable_https: bool,
    /// Base directory holding one store directory per user login.
    pub client_db_path: PathBuf,
    /// Explicit auth token file location, if overridden.
    pub token_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Build the configuration from the environment plus CLI overrides.
    pub fn load(overrides: &ConfigOverrides) -> Self {
        let env_base = std::env::var("BASE_URL").ok();
        let mut base_url = overrides
            .base_url
            .clone()
            .or(env_base)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !is_host_port(&base_url) {
            base_url = DEFAULT_BASE_URL.to_string();
        }

        let enable_https = overrides.https
            || std::env::var("ENABLE_HTTPS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(false);

        let client_db_path = std::env::var("CLIENT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| platform::default_users_dir());

        let token_file = std::env::var("TOKEN_FILE").ok().map(PathBuf::from);

        Self {
            base_url,
            enable_https,
            client_db_path,
            token_file,
        }
    }

    /// Full server URL with scheme.
    pub fn server_url(&self) -> String {
        if self.enable_https {
            format!("https://{}", self.base_url)
        } else {
            format!("http://{}", self.base_url)
        }
    }
}

/// Check that `s` is a bare `host:port` with no scheme or path.
fn is_host_port(s: &str) -> bool {
    let Some((host, port)) = s.rsplit_once(':') else {
        return false;
    };
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    !port.is_empty() && port.len() <= 5 && port.chars().all(|c| c.is_ascii_digit())
}
