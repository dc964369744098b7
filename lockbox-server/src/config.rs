//! Server configuration from the environment.

const DEFAULT_BASE_URL: &str = "localhost:8081";
const DEFAULT_BLOB_MAX_MB: u64 = 50;

/// Overhead allowed on top of the cipher limit for multipart framing.
const BODY_OVERHEAD: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite database path.
    pub database_uri: String,
    /// Secret keying the signed auth tokens.
    pub auth_secret: String,
    /// Listen address as `host:port`.
    pub base_url: String,
    pub enable_https: bool,
    /// Maximum accepted blob cipher size, in MiB.
    pub blob_max_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_uri: "lockbox.db".to_string(),
            auth_secret: "dev-secret-key".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            enable_https: false,
            blob_max_mb: DEFAULT_BLOB_MAX_MB,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(uri) = std::env::var("DATABASE_URI") {
            if !uri.is_empty() {
                cfg.database_uri = uri;
            }
        }
        if let Ok(secret) = std::env::var("AUTH_SECRET") {
            if !secret.is_empty() {
                cfg.auth_secret = secret;
            }
        }
        if let Ok(url) = std::env::var("BASE_URL") {
            if is_host_port(&url) {
                cfg.base_url = url;
            }
        }
        if let Ok(v) = std::env::var("ENABLE_HTTPS") {
            cfg.enable_https = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes");
        }
        if let Ok(v) = std::env::var("BLOB_MAX_MB") {
            if let Ok(mb) = v.parse::<u64>() {
                cfg.blob_max_mb = mb;
            }
        }

        cfg
    }

    /// Hard limit on an uploaded cipher, in bytes.
    pub fn max_cipher_bytes(&self) -> usize {
        (self.blob_max_mb as usize) * 1024 * 1024
    }

    /// Request body cap: the cipher limit plus framing overhead.
    pub fn max_body_bytes(&self) -> usize {
        self.max_cipher_bytes() + BODY_OVERHEAD
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.base_url, "localhost:8081");
        assert_eq!(cfg.blob_max_mb, 50);
        assert_eq!(cfg.max_cipher_bytes(), 50 * 1024 * 1024);
        assert!(cfg.max_body_bytes() > cfg.max_cipher_bytes());
    }

    #[test]
    fn listen_address_validation() {
        assert!(is_host_port("0.0.0.0:8081"));
        assert!(!is_host_port("http://0.0.0.0:8081"));
        assert!(!is_host_port("8081"));
    }
}
