//! Contact storage (the `contact` table, Section 4.7).

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use depeche_types::Contact;

use crate::{sqlite_err, Result};

fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
    Ok(Contact {
        contact_id: row.get(0)?,
        nickname: row.get(1)?,
        alias: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Store a new contact, returning its internal id.
pub fn store_contact(conn: &rusqlite::Connection, nickname: &str, alias: &str) -> Result<String> {
    let contact_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO contact (id, nickname, alias, created_at, modified_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![contact_id, nickname, alias, now],
    )
    .map_err(sqlite_err)?;
    Ok(contact_id)
}

pub fn read_contact(conn: &rusqlite::Connection, contact_id: &str) -> Result<Option<Contact>> {
    conn.query_row(
        "SELECT id, nickname, alias, created_at FROM contact WHERE id = ?1",
        params![contact_id],
        row_to_contact,
    )
    .optional()
    .map_err(sqlite_err)
}

pub fn read_contact_from_nickname(conn: &rusqlite::Connection, nickname: &str) -> Result<Option<Contact>> {
    conn.query_row(
        "SELECT id, nickname, alias, created_at FROM contact WHERE nickname = ?1",
        params![nickname],
        row_to_contact,
    )
    .optional()
    .map_err(sqlite_err)
}

pub fn get_contacts(conn: &rusqlite::Connection) -> Result<Vec<Contact>> {
    let mut stmt = conn
        .prepare("SELECT id, nickname, alias, created_at FROM contact ORDER BY nickname")
        .map_err(sqlite_err)?;
    let rows = stmt.query_map([], row_to_contact).map_err(sqlite_err)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sqlite_err)
}

pub fn remove_contact(conn: &rusqlite::Connection, contact_id: &str) -> Result<()> {
    conn.execute("DELETE FROM contact WHERE id = ?1", params![contact_id])
        .map_err(sqlite_err)?;
    Ok(())
}
