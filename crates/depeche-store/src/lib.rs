//! # depeche-store
//!
//! The address & key store (Section 4.7): the source of truth for
//! addresses, keys, contacts, and stored messages, backed by SQLite.
//!
//! Schema follows the five original tables exactly (`contact`, `nacl_key`,
//! `foreign_address`, `own_address`, `message`) — see [`schema`]. Each
//! worker (exchange server task, rendezvous task, CLI command) is expected
//! to [`open`] its own connection to the same file rather than share one
//! behind a lock; that's the "connection-per-task" discipline Section 4.7
//! asks for, adapted from a thread-per-connection model to tokio tasks.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;

use rusqlite::Connection;

use depeche_types::DepecheError;

pub type Result<T> = std::result::Result<T, DepecheError>;

/// Open (creating if absent) the store at `path`, configuring WAL mode and
/// running any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(sqlite_err)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory store — used by tests and by the end-to-end scenarios
/// in `depeche-daemon`.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(sqlite_err)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(sqlite_err)
}

pub(crate) fn sqlite_err(e: rusqlite::Error) -> DepecheError {
    DepecheError::Store(e.to_string())
}
