//! Key and address-pad minting (Section 3, Section 4.7): the glue between
//! the crypto provider and the store that neither of those crates owns —
//! deciding *when* to mint a fresh key versus reuse the least-used one, and
//! turning that decision into a batch of addresses.

use depeche_types::{Address, DepecheError, KeyId};
use rusqlite::Connection;

/// One key's worth of freshly minted addresses, not yet bound to a contact.
pub struct MintedPad {
    pub key_id: KeyId,
    pub public_key: String,
    pub addresses: Vec<Address>,
}

/// Mint `size` addresses for a new pad, reusing this node's least-used own
/// key if one exists rather than generating a new keypair for every pad
/// (spec.md §4.7: "the design discourages reuse" of a key across many
/// addresses is about *contacts* sharing a key, not about minting a fresh
/// key per pad — reuse within one node's own key is the throttle
/// `least_used_own_key` exists for).
pub fn mint_pad(conn: &Connection, size: usize) -> Result<MintedPad, DepecheError> {
    let (key_id, public_key) = match depeche_store::queries::keys::least_used_own_key(conn)? {
        Some(existing) => existing,
        None => {
            let (private_key, public_key) = depeche_crypto::generate_keypair();
            let key_id = depeche_store::queries::keys::store_own_keypair(conn, &private_key, &public_key)?;
            (key_id, public_key)
        }
    };

    let addresses = (0..size).map(|_| Address::generate()).collect();
    Ok(MintedPad {
        key_id,
        public_key,
        addresses,
    })
}

/// Persist a minted pad's addresses as this node's own, handed to
/// `contact_id`. Called only once the contact exists to hand them to —
/// before that (e.g. mid-rendezvous, before the peer's alias is known) the
/// pad exists only in memory.
pub fn bind_pad_to_contact(
    conn: &Connection,
    pad: &MintedPad,
    contact_id: &str,
) -> Result<(), DepecheError> {
    for address in &pad.addresses {
        depeche_store::queries::addresses::store_own_address(conn, address, contact_id, &pad.key_id)?;
    }
    Ok(())
}
