//! User accounts: creation and credential verification.

use super::{now_micros, Result, Storage, StorageError};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{params, OptionalExtension};

impl Storage {
    /// Create a user with an argon2id-hashed password. Returns the new user
    /// id; fails with [`StorageError::LoginTaken`] on a duplicate login.
    pub fn create_user(&self, login: &str, password: &str) -> Result<i64> {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StorageError::Hash(e.to_string()))?
            .to_string();

        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO users (login, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![login, hash, now_micros()],
        );
        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::LoginTaken(login.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verify credentials. Returns the user id on a match, `None` on an
    /// unknown login or wrong password.
    pub fn verify_user(&self, login: &str, password: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE login = ?1",
                [login],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let Some((user_id, stored)) = row else {
            return Ok(None);
        };
        let Ok(parsed) = PasswordHash::new(&stored) else {
            return Err(StorageError::Hash("stored hash unparsable".to_string()));
        };
        let ok = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
        Ok(ok.then_some(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_verify() {
        let storage = Storage::in_memory().unwrap();
        let id = storage.create_user("alice", "hunter2").unwrap();

        assert_eq!(storage.verify_user("alice", "hunter2").unwrap(), Some(id));
        assert_eq!(storage.verify_user("alice", "wrong").unwrap(), None);
        assert_eq!(storage.verify_user("nobody", "hunter2").unwrap(), None);
    }

    #[test]
    fn duplicate_login_rejected() {
        let storage = Storage::in_memory().unwrap();
        storage.create_user("alice", "pw1").unwrap();
        assert!(matches!(
            storage.create_user("alice", "pw2"),
            Err(StorageError::LoginTaken(_))
        ));
    }
}
