//! `depeched pad`: mint a fresh batch of own addresses for a contact
//! outside of rendezvous — the "explicit pad-exchange" spec.md §3 mentions
//! as the other way addresses get created.

use anyhow::Context;

use depeche_body::{AddressPad, KeyMapping};

use crate::config::DaemonConfig;
use crate::identity;

pub fn run(config: DaemonConfig, nickname: &str, size: usize) -> anyhow::Result<()> {
    let db_path = config.data_dir().join("depeche.db");
    let conn = depeche_store::open(&db_path)?;

    let contact = depeche_store::queries::contacts::read_contact_from_nickname(&conn, nickname)?
        .with_context(|| format!("no contact named {nickname:?} — rendezvous first"))?;

    let pad = identity::mint_pad(&conn, size)?;
    identity::bind_pad_to_contact(&conn, &pad, &contact.contact_id)?;

    let address_pad = AddressPad {
        from_alias: config.identity.alias.clone(),
        key_mappings: vec![KeyMapping {
            public_key: pad.public_key.clone(),
            addresses: pad.addresses.clone(),
        }],
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&address_pad).expect("AddressPad serialization cannot fail")
    );
    Ok(())
}
