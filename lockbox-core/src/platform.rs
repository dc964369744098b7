//! Platform-specific paths for client state.

use std::path::PathBuf;

/// Per-platform configuration directory for lockbox client state.
///
/// Returns:
/// - Windows: %APPDATA%\lockbox
/// - macOS: ~/Library/Application Support/lockbox
/// - Linux/Other: ~/.config/lockbox
pub fn config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("lockbox")
}

/// Default base directory holding one store directory per user login.
pub fn default_users_dir() -> PathBuf {
    config_dir().join("users")
}
