//! Persisted client session state.
//!
//! Three small files live under the user-config directory: the raw auth
//! token, the active login, and a per-login sync watermark
//! (`last_sync_at_<login>`). Token and login files are written with mode
//! 0600.

use crate::config::ClientConfig;
use crate::{LockboxError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const TOKEN_FILE: &str = "auth_token";
const LAST_LOGIN_FILE: &str = "last_login";

/// File-backed session store for the CLI.
#[derive(Debug, Clone)]
pub struct Session {
    dir: PathBuf,
    token_file: Option<PathBuf>,
}

impl Session {
    /// Session rooted at the default platform config directory.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            dir: crate::platform::config_dir(),
            token_file: config.token_file.clone(),
        }
    }

    /// Session rooted at an explicit directory (used by tests).
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            token_file: None,
        }
    }

    fn token_path(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| self.dir.join(TOKEN_FILE))
    }

    /// Persist the auth token.
    pub fn save_token(&self, token: &str) -> Result<()> {
        write_restricted(&self.token_path(), token.as_bytes())
    }

    /// Load the auth token, failing when no user has logged in.
    pub fn load_token(&self) -> Result<String> {
        read_trimmed(&self.token_path()).ok_or(LockboxError::NoActiveUser)
    }

    /// Persist the active login name.
    pub fn save_login(&self, login: &str) -> Result<()> {
        if login.is_empty() {
            return Err(LockboxError::InvalidInput("empty login".into()));
        }
        write_restricted(&self.dir.join(LAST_LOGIN_FILE), login.as_bytes())
    }

    /// Load the active login name.
    pub fn load_login(&self) -> Result<String> {
        read_trimmed(&self.dir.join(LAST_LOGIN_FILE)).ok_or(LockboxError::NoActiveUser)
    }

    /// Persist the per-login sync watermark (an RFC3339 server timestamp).
    pub fn save_last_sync_at(&self, login: &str, at: &str) -> Result<()> {
        write_restricted(&self.last_sync_path(login), at.as_bytes())
    }

    /// Load the per-login sync watermark, if one has been recorded.
    pub fn load_last_sync_at(&self, login: &str) -> Option<String> {
        read_trimmed(&self.last_sync_path(login))
    }

    fn last_sync_path(&self, login: &str) -> PathBuf {
        self.dir.join(format!("last_sync_at_{}", login))
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let trimmed = raw.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn write_restricted(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn token_roundtrip() {
        let dir = TempDir::new().unwrap();
        let session = Session::with_dir(dir.path().to_path_buf());

        assert!(session.load_token().is_err());
        session.save_token("tok-123").unwrap();
        assert_eq!(session.load_token().unwrap(), "tok-123");
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let session = Session::with_dir(dir.path().to_path_buf());
        session.save_token("tok-123\n").unwrap();
        assert_eq!(session.load_token().unwrap(), "tok-123");
    }

    #[test]
    fn watermark_is_per_login() {
        let dir = TempDir::new().unwrap();
        let session = Session::with_dir(dir.path().to_path_buf());

        session
            .save_last_sync_at("alice", "2024-05-01T10:00:00Z")
            .unwrap();
        assert_eq!(
            session.load_last_sync_at("alice").unwrap(),
            "2024-05-01T10:00:00Z"
        );
        assert!(session.load_last_sync_at("bob").is_none());
    }

    #[test]
    fn empty_login_rejected() {
        let dir = TempDir::new().unwrap();
        let session = Session::with_dir(dir.path().to_path_buf());
        assert!(session.save_login("").is_err());
    }
}
