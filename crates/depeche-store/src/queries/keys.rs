//! Key-record storage (the `nacl_key` table, Section 4.7).

use rusqlite::{params, OptionalExtension};

use depeche_types::{DepecheError, KeyId};

use crate::{sqlite_err, Result};

/// Store a keypair this node generated for itself. Returns the new key's id.
pub fn store_own_keypair(conn: &rusqlite::Connection, private_key: &str, public_key: &str) -> Result<KeyId> {
    let key_id = KeyId::generate();
    conn.execute(
        "INSERT INTO nacl_key (id, is_own, private_key, public_key) VALUES (?1, 1, ?2, ?3)",
        params![key_id.as_str(), private_key, public_key],
    )
    .map_err(sqlite_err)?;
    Ok(key_id)
}

/// Store a contact's public key. Returns the new key's id.
pub fn store_contact_key(conn: &rusqlite::Connection, public_key: &str) -> Result<KeyId> {
    let key_id = KeyId::generate();
    conn.execute(
        "INSERT INTO nacl_key (id, is_own, private_key, public_key) VALUES (?1, 0, NULL, ?2)",
        params![key_id.as_str(), public_key],
    )
    .map_err(sqlite_err)?;
    Ok(key_id)
}

/// The own key with the fewest addresses referencing it, used to throttle
/// key reuse. Ties break on `key_id` ascending for deterministic tests.
pub fn least_used_own_key(conn: &rusqlite::Connection) -> Result<Option<(KeyId, String)>> {
    conn.query_row(
        "SELECT nacl_key.id, nacl_key.public_key, COUNT(own_address.id) AS usage
         FROM nacl_key
         LEFT JOIN own_address ON nacl_key.id = own_address.key_id
         WHERE nacl_key.is_own = 1
         GROUP BY nacl_key.id
         ORDER BY usage ASC, nacl_key.id ASC
         LIMIT 1",
        [],
        |row| {
            let id: String = row.get(0)?;
            let public_key: String = row.get(1)?;
            Ok((KeyId::from_raw(id), public_key))
        },
    )
    .optional()
    .map_err(sqlite_err)
}

/// Remove one of this node's own keys. Fails with
/// [`DepecheError::StoreConflict`] if an address still references it — the
/// caller is expected to swallow that specific failure
/// (`clean_out_received_message`, Section 4.7).
pub fn remove_own_key(conn: &rusqlite::Connection, key_id: &KeyId) -> Result<()> {
    let still_referenced: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM own_address WHERE key_id = ?1",
            params![key_id.as_str()],
            |row| row.get(0),
        )
        .map_err(sqlite_err)?;
    if still_referenced > 0 {
        return Err(DepecheError::StoreConflict(format!("key {key_id} still in use")));
    }
    conn.execute(
        "DELETE FROM nacl_key WHERE id = ?1 AND is_own = 1",
        params![key_id.as_str()],
    )
    .map_err(sqlite_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::addresses;
    use crate::queries::contacts;
    use depeche_types::Address;

    #[test]
    fn least_used_own_key_prefers_unreferenced_key() {
        let conn = crate::open_memory().unwrap();
        let key_a = store_own_keypair(&conn, "priv-a", "pub-a").unwrap();
        let key_b = store_own_keypair(&conn, "priv-b", "pub-b").unwrap();
        let contact_id = contacts::store_contact(&conn, "bob", "bob-alias").unwrap();
        addresses::store_own_address(&conn, &Address::generate(), &contact_id, &key_a).unwrap();

        let (least_used, _) = least_used_own_key(&conn).unwrap().unwrap();
        assert_eq!(least_used, key_b);
    }

    #[test]
    fn remove_in_use_key_is_a_store_conflict() {
        let conn = crate::open_memory().unwrap();
        let key_id = store_own_keypair(&conn, "priv", "pub").unwrap();
        let contact_id = contacts::store_contact(&conn, "bob", "bob-alias").unwrap();
        addresses::store_own_address(&conn, &Address::generate(), &contact_id, &key_id).unwrap();

        let err = remove_own_key(&conn, &key_id).unwrap_err();
        assert!(err.is_store_conflict());
    }

    #[test]
    fn remove_unreferenced_key_succeeds() {
        let conn = crate::open_memory().unwrap();
        let key_id = store_own_keypair(&conn, "priv", "pub").unwrap();
        remove_own_key(&conn, &key_id).unwrap();
    }
}
