//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas and the busy timeout.
//! - Trigger schema migrations and credential checks before returning a
//!   usable connection.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.
//! - `open_connection` only returns authenticated, ping-verified handles.

use super::auth::authenticate;
use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::{ConnectionConfig, StoreLocation, DEFAULT_BUSY_TIMEOUT};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file and applies all pending migrations.
///
/// No credential check is performed; see `open_connection`.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with("file", || Connection::open(path), DEFAULT_BUSY_TIMEOUT)
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory, DEFAULT_BUSY_TIMEOUT)
}

/// Opens the store described by `config`, authenticates and pings it.
///
/// # Side effects
/// - Creates the database file when it does not exist yet.
/// - Emits `db_open` and `db_auth` logging events.
///
/// # Errors
/// - `Sqlite` for open/bootstrap failures.
/// - `UnsupportedSchemaVersion` for files written by a newer build.
/// - `AuthenticationFailed` when credentials are missing or wrong.
pub fn open_connection(config: &ConnectionConfig) -> DbResult<Connection> {
    let conn = match &config.location {
        StoreLocation::File(path) => {
            open_with("file", || Connection::open(path), config.busy_timeout)?
        }
        StoreLocation::Memory => {
            open_with("memory", Connection::open_in_memory, config.busy_timeout)?
        }
    };

    authenticate(&conn, config.credentials.as_ref())?;
    conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
    Ok(conn)
}

fn open_with<F>(mode: &str, open: F, busy_timeout: Duration) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, busy_timeout) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
