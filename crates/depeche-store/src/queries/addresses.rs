//! Address storage: `own_address` (addresses this node announces so peers
//! can reach it) and `foreign_address` (addresses a contact has given this
//! node to send to) — Section 4.7.

use rusqlite::{params, OptionalExtension};

use depeche_types::{Address, KeyId};

use crate::{sqlite_err, Result};

/// One entry of an address pad: an address this node may send to, and the
/// public key to encrypt under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPadEntry {
    pub address: Address,
    pub public_key: String,
}

/// Register a new own address, handed to `contact_id`, encrypted under
/// `key_id`. Freshly stored addresses are unused.
pub fn store_own_address(
    conn: &rusqlite::Connection,
    address: &Address,
    contact_id: &str,
    key_id: &KeyId,
) -> Result<()> {
    conn.execute(
        "INSERT INTO own_address (id, given_to, key_id, is_used) VALUES (?1, ?2, ?3, 0)",
        params![address.as_str(), contact_id, key_id.as_str()],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

/// Mark an own address as used, on receiving a message addressed to it.
pub fn mark_own_address_used(conn: &rusqlite::Connection, address: &Address) -> Result<()> {
    conn.execute(
        "UPDATE own_address SET is_used = 1 WHERE id = ?1",
        params![address.as_str()],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn remove_own_address(conn: &rusqlite::Connection, address: &Address) -> Result<()> {
    conn.execute("DELETE FROM own_address WHERE id = ?1", params![address.as_str()])
        .map_err(sqlite_err)?;
    Ok(())
}

/// The key id and private key bound to an own address, or `None` if the
/// address is not ours.
pub fn get_own_address_key(conn: &rusqlite::Connection, address: &Address) -> Result<Option<(KeyId, String)>> {
    conn.query_row(
        "SELECT nacl_key.id, nacl_key.private_key
         FROM nacl_key
         JOIN own_address ON nacl_key.id = own_address.key_id
         WHERE nacl_key.is_own = 1 AND own_address.id = ?1",
        params![address.as_str()],
        |row| {
            let id: String = row.get(0)?;
            let private_key: Option<String> = row.get(1)?;
            Ok((KeyId::from_raw(id), private_key.unwrap_or_default()))
        },
    )
    .optional()
    .map_err(sqlite_err)
}

pub fn is_own_unused_address(conn: &rusqlite::Connection, address: &Address) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM own_address WHERE id = ?1 AND is_used = 0",
            params![address.as_str()],
            |row| row.get(0),
        )
        .map_err(sqlite_err)?;
    Ok(count > 0)
}

/// Store an address a contact has given us to send to. Idempotent:
/// re-storing the same address replaces its binding (spec.md §4.7, "replace
/// semantics").
pub fn store_contact_address(
    conn: &rusqlite::Connection,
    contact_id: &str,
    address: &Address,
    key_id: &KeyId,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO foreign_address (id, contact_id, key_id, is_used) VALUES (?1, ?2, ?3, 0)",
        params![address.as_str(), contact_id, key_id.as_str()],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn mark_contact_address_used(conn: &rusqlite::Connection, address: &Address) -> Result<()> {
    conn.execute(
        "UPDATE foreign_address SET is_used = 1 WHERE id = ?1",
        params![address.as_str()],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

/// At most `size` unused addresses pointing to `contact_id`, each carrying
/// the public key to encrypt under. `size = None` returns every unused
/// address.
pub fn address_pad_for(
    conn: &rusqlite::Connection,
    contact_id: &str,
    size: Option<usize>,
) -> Result<Vec<AddressPadEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT fa.id, nacl_key.public_key
             FROM foreign_address AS fa
             JOIN nacl_key ON fa.key_id = nacl_key.id
             WHERE fa.contact_id = ?1 AND fa.is_used = 0
             LIMIT ?2",
        )
        .map_err(sqlite_err)?;

    let limit = size.map(|s| s as i64).unwrap_or(-1);
    let rows = stmt
        .query_map(params![contact_id, limit], |row| {
            let address: String = row.get(0)?;
            let public_key: String = row.get(1)?;
            Ok(AddressPadEntry {
                address: Address::from_raw(address),
                public_key,
            })
        })
        .map_err(sqlite_err)?;

    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(sqlite_err)
}

pub fn unused_address_count(conn: &rusqlite::Connection, contact_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM foreign_address WHERE contact_id = ?1 AND is_used = 0",
        params![contact_id],
        |row| row.get(0),
    )
    .map_err(sqlite_err)
}
