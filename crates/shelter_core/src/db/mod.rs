//! SQLite storage bootstrap, schema migrations and store authentication.
//!
//! # Responsibility
//! - Open and configure the SQLite connection that backs a document store.
//! - Apply schema migrations in deterministic order.
//! - Verify store credentials before a connection is handed out.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No document is read or written before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod auth;
pub mod migrations;
mod open;

pub use auth::{authenticate, register_user, registered_user_count};
pub use open::{open_connection, open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Missing or mismatching credentials for a store with registered users.
    AuthenticationFailed {
        username: Option<String>,
    },
    InvalidUser(String),
    UserExists(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::AuthenticationFailed { username: Some(username) } => {
                write!(f, "authentication failed for user `{username}`")
            }
            Self::AuthenticationFailed { username: None } => {
                write!(f, "authentication required: store has registered users")
            }
            Self::InvalidUser(message) => write!(f, "invalid user: {message}"),
            Self::UserExists(username) => write!(f, "user `{username}` already exists"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. }
            | Self::AuthenticationFailed { .. }
            | Self::InvalidUser(_)
            | Self::UserExists(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
