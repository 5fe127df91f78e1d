//! Forward-only migrations, tracked via `PRAGMA user_version`.

use rusqlite::Connection;

use crate::{schema, sqlite_err, Result};

pub fn run(conn: &Connection) -> Result<()> {
    let current_version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(sqlite_err)?;

    if current_version == 0 {
        tracing::info!("initializing store schema v{}", schema::SCHEMA_VERSION);
        conn.execute_batch(schema::SCHEMA_V1).map_err(sqlite_err)?;
        conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)
            .map_err(sqlite_err)?;
    } else if current_version > schema::SCHEMA_VERSION {
        return Err(depeche_types::DepecheError::Store(format!(
            "store schema version {current_version} is newer than supported {}",
            schema::SCHEMA_VERSION
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0)).unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
    }

    #[test]
    fn tables_are_created() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        for table in ["contact", "nacl_key", "foreign_address", "own_address", "message"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {table} should exist");
        }
    }
}
