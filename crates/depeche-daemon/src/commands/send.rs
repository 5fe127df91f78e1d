//! `depeched send`: queue a message to a known contact for pickup by the
//! next exchange (Section 4.6, Section 6's body convention).

use anyhow::{bail, Context};

use crate::config::DaemonConfig;
use crate::worker;

pub fn run(config: DaemonConfig, nickname: &str, text: &str) -> anyhow::Result<()> {
    let db_path = config.data_dir().join("depeche.db");
    let conn = depeche_store::open(&db_path)?;

    let contact = depeche_store::queries::contacts::read_contact_from_nickname(&conn, nickname)?
        .with_context(|| format!("no contact named {nickname:?} — rendezvous or `pad` first"))?;

    let mut pad = depeche_store::queries::addresses::address_pad_for(&conn, &contact.contact_id, Some(1))?;
    let Some(entry) = pad.pop() else {
        bail!("no unused addresses left for {nickname:?} — ask for a fresh pad");
    };
    drop(conn);

    let body = depeche_body::compose(&depeche_body::UserMessageBody {
        to_nickname: nickname.to_string(),
        from_alias: config.identity.alias.clone(),
        text: text.to_string(),
        address_pad_request: None,
        address_pad: None,
    });

    let id = worker::queue_outbound_message(&db_path, &entry.address, &entry.public_key, &body)?;

    let conn = depeche_store::open(&db_path)?;
    depeche_store::queries::addresses::mark_contact_address_used(&conn, &entry.address)?;

    println!("queued message {id} to {} via {}", nickname, entry.address);
    Ok(())
}
