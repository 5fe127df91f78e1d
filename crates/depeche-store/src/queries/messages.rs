//! Message storage (the `message` table, Section 4.7): content-addressed,
//! idempotent storage for gossiped user messages.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use depeche_types::{Address, StoredMessage};

use crate::queries::{addresses, keys};
use crate::{sqlite_err, Result};

fn row_to_stored_message(row: &rusqlite::Row) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        received_at: row.get(1)?,
        last_seen_at: row.get(2)?,
        forward_count: row.get::<_, i64>(3)? as u32,
        header_address: Address::from_raw(row.get::<_, String>(4)?),
        header_sent_at: row.get(5)?,
        contents: row.get(6)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, meta_received_at, meta_last_seen_at, meta_forward_count, header_address, header_sent_at, body_contents";

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Store a message, keyed by `SHA-256(contents)`. Storing the same contents
/// twice is a no-op that still returns the (unchanged) id — storage is
/// idempotent since gossip can deliver the same message through more than
/// one peer.
pub fn store_message(
    conn: &rusqlite::Connection,
    header_address: &Address,
    header_sent_at: DateTime<Utc>,
    contents: &str,
) -> Result<String> {
    let id = hex::encode(Sha256::digest(contents.as_bytes()));
    let now = Utc::now();

    let inserted = conn.execute(
        "INSERT INTO message (id, meta_received_at, meta_last_seen_at, meta_forward_count, header_address, header_sent_at, body_contents)
         VALUES (?1, ?2, ?2, 0, ?3, ?4, ?5)",
        params![id, now, header_address.as_str(), header_sent_at, contents],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            tracing::info!(id = %id, "message already exists in store");
        }
        Err(e) => return Err(sqlite_err(e)),
    }

    Ok(id)
}

pub fn read_message(conn: &rusqlite::Connection, id: &str) -> Result<Option<StoredMessage>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM message WHERE id = ?1"),
        params![id],
        row_to_stored_message,
    )
    .optional()
    .map_err(sqlite_err)
}

pub fn remove_message(conn: &rusqlite::Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM message WHERE id = ?1", params![id])
        .map_err(sqlite_err)?;
    Ok(())
}

/// Messages whose forward count is below `forward_cap`, ripe for
/// re-gossiping to other peers.
pub fn messages_to_forward(conn: &rusqlite::Connection, forward_cap: u32) -> Result<Vec<StoredMessage>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM message WHERE meta_forward_count < ?1"
        ))
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![forward_cap], row_to_stored_message)
        .map_err(sqlite_err)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sqlite_err)
}

/// Messages addressed to one of our own addresses that has actually been
/// handed to a contact (i.e. not an address we generated but never gave
/// out).
pub fn received_messages(conn: &rusqlite::Connection) -> Result<Vec<StoredMessage>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {cols} FROM message
             JOIN own_address ON own_address.id = message.header_address
             WHERE own_address.given_to IS NOT NULL
             ORDER BY message.meta_received_at DESC",
            cols = SELECT_COLUMNS
                .split(", ")
                .map(|c| format!("message.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .map_err(sqlite_err)?;
    let rows = stmt.query_map([], row_to_stored_message).map_err(sqlite_err)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sqlite_err)
}

/// Record that this node handed `id` to the exchange loop's send-phase for
/// forwarding to another peer. This is the counter `messages_to_forward`
/// caps against.
pub fn increment_forward_count(conn: &rusqlite::Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE message SET meta_forward_count = meta_forward_count + 1, meta_last_seen_at = ?2 WHERE id = ?1",
        params![id, Utc::now()],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

/// Remove the address a received message arrived on (so it cannot be
/// re-delivered or linked back to us), and the key behind it if nothing
/// else references it. A no-op if the message was never ours or has
/// already been cleaned out.
pub fn clean_out_received_message(conn: &rusqlite::Connection, id: &str) -> Result<()> {
    let Some(message) = read_message(conn, id)? else {
        return Ok(());
    };

    let Some((key_id, _)) = addresses::get_own_address_key(conn, &message.header_address)? else {
        tracing::info!(id = %id, "clean-out called on a message not bound to an own key");
        return Ok(());
    };

    addresses::remove_own_address(conn, &message.header_address)?;

    if let Err(e) = keys::remove_own_key(conn, &key_id) {
        if !e.is_store_conflict() {
            return Err(e);
        }
    }
    Ok(())
}
