//! Store user registry and credential verification.
//!
//! # Invariants
//! - Passwords are stored as salted SHA-256 digests, never in clear text.
//! - A store with zero registered users accepts any connection.
//! - Once a user exists, every connection must present valid credentials.

use super::{DbError, DbResult};
use crate::config::Credentials;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Registers a store user with a freshly generated salt.
///
/// # Errors
/// - `InvalidUser` for blank usernames or empty passwords.
/// - `UserExists` when the username is already registered.
pub fn register_user(conn: &Connection, credentials: &Credentials) -> DbResult<()> {
    let username = credentials.username.trim();
    if username.is_empty() {
        return Err(DbError::InvalidUser("username cannot be empty".to_string()));
    }
    if credentials.password.is_empty() {
        return Err(DbError::InvalidUser("password cannot be empty".to_string()));
    }

    let salt = Uuid::new_v4().simple().to_string();
    let hash = password_digest(&salt, &credentials.password);
    let inserted = conn.execute(
        "INSERT INTO store_users (username, password_salt, password_hash)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(username) DO NOTHING;",
        params![username, salt, hash],
    )?;
    if inserted == 0 {
        return Err(DbError::UserExists(username.to_string()));
    }

    info!("event=user_register module=db status=ok");
    Ok(())
}

/// Returns how many users are registered in the store.
pub fn registered_user_count(conn: &Connection) -> DbResult<u64> {
    let count = conn.query_row("SELECT COUNT(*) FROM store_users;", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Verifies `credentials` against the store user registry.
pub fn authenticate(conn: &Connection, credentials: Option<&Credentials>) -> DbResult<()> {
    if registered_user_count(conn)? == 0 {
        info!("event=db_auth module=db status=ok mode=open");
        return Ok(());
    }

    let Some(credentials) = credentials else {
        warn!("event=db_auth module=db status=error error_code=credentials_missing");
        return Err(DbError::AuthenticationFailed { username: None });
    };

    let username = credentials.username.trim();
    let stored = conn
        .query_row(
            "SELECT password_salt, password_hash FROM store_users WHERE username = ?1;",
            [username],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let verified = stored.is_some_and(|(salt, hash)| {
        constant_time_eq(
            password_digest(&salt, &credentials.password).as_bytes(),
            hash.as_bytes(),
        )
    });
    if !verified {
        warn!("event=db_auth module=db status=error error_code=credentials_rejected");
        return Err(DbError::AuthenticationFailed {
            username: Some(username.to_string()),
        });
    }

    info!("event=db_auth module=db status=ok mode=credentials");
    Ok(())
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
