//! Per-user key persistence.
//!
//! The field key lives in `key.bin` inside the user's store directory with
//! restrictive permissions. It is created lazily on first use and reused for
//! every later operation on this device. Concurrent first-write races are
//! tolerated; a foreign key simply makes decryption of the other writer's
//! ciphertext fail, which callers surface as a sentinel.

use crate::crypto::{cipher::KEY_LEN, FieldKey, Result};
use rand::RngCore;
use std::fs;
use std::path::Path;

const KEY_FILE: &str = "key.bin";

/// Load the user's field key from `dir`, creating a fresh random one if the
/// file does not exist yet. A key file with the wrong length is an error.
pub fn load_or_create_key(dir: &Path) -> Result<FieldKey> {
    let path = dir.join(KEY_FILE);

    if let Ok(bytes) = fs::read(&path) {
        return FieldKey::from_bytes(&bytes);
    }

    fs::create_dir_all(dir)?;

    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);

    write_restricted(&path, &key)?;
    FieldKey::from_bytes(&key)
}

#[cfg(unix)]
fn write_restricted(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, bytes)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt, encrypt};
    use tempfile::TempDir;

    #[test]
    fn creates_key_on_first_use() {
        let dir = TempDir::new().unwrap();
        let key = load_or_create_key(dir.path()).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_LEN);
        assert!(dir.path().join(KEY_FILE).exists());
    }

    #[test]
    fn reuses_persisted_key() {
        let dir = TempDir::new().unwrap();
        let key1 = load_or_create_key(dir.path()).unwrap();
        let key2 = load_or_create_key(dir.path()).unwrap();

        let (cipher, nonce) = encrypt(b"payload", &key1).unwrap();
        assert_eq!(decrypt(&cipher, &nonce, &key2).unwrap(), b"payload");
    }

    #[test]
    fn rejects_truncated_key_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(KEY_FILE), [0u8; 7]).unwrap();
        assert!(load_or_create_key(dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        load_or_create_key(dir.path()).unwrap();
        let mode = fs::metadata(dir.path().join(KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
