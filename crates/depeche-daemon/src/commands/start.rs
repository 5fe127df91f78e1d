//! `depeched start`: optionally pair with a new peer over a pre-shared
//! secret (Section 4.5), then run the exchange server and dialer (Section
//! 4.6, Section 5) until interrupted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use depeche_rendezvous::{rendezvous, RendezvousConfig};
use depeche_types::RendezvousInfo;

use crate::config::DaemonConfig;
use crate::identity;
use crate::worker;

/// How many addresses a fresh rendezvous pad hands the peer.
const RENDEZVOUS_PAD_SIZE: usize = 20;

pub async fn run(config: DaemonConfig, secret_file: Option<PathBuf>) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.data_dir())?;
    let db_path = config.data_dir().join("depeche.db");
    // Ensure the schema exists before any worker opens its own connection.
    depeche_store::open(&db_path)?;

    if let Some(secret_path) = secret_file {
        let secret = std::fs::read_to_string(&secret_path)?.trim().to_string();
        run_rendezvous(&db_path, &config, &secret).await?;
    }

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let dialer_cancel = cancel.clone();
    let server_db = db_path.clone();
    let dialer_db = db_path.clone();
    let server_network = config.network.clone();
    let dialer_network = config.network.clone();
    let server_callsign = config.identity.callsign.clone();
    let dialer_callsign = config.identity.callsign.clone();

    let server = tokio::spawn(worker::run_exchange_server(server_db, server_network, server_callsign, server_cancel));
    let dialer = tokio::spawn(worker::run_exchange_dialer(dialer_db, dialer_network, dialer_callsign, dialer_cancel));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping workers");
    cancel.cancel();
    let _ = server.await;
    let _ = dialer.await;
    Ok(())
}

/// Run one rendezvous attempt against `secret`, persisting the resulting
/// contact, key, and address pads on success. Exposed for the
/// `depeche-daemon` integration suite; `start` is the only caller in the
/// binary itself.
pub async fn run_rendezvous(db_path: &Path, config: &DaemonConfig, secret: &str) -> anyhow::Result<()> {
    let conn = depeche_store::open(db_path)?;
    let pad = identity::mint_pad(&conn, RENDEZVOUS_PAD_SIZE)?;
    let own_info = RendezvousInfo::new(config.identity.alias.clone(), pad.addresses.clone(), pad.public_key.clone());
    drop(conn);

    let rendezvous_config = RendezvousConfig {
        callsign: config.identity.callsign.clone(),
        own_info,
        shared_secret: secret.to_string(),
        announce_port: config.network.announce_port,
        rendezvous_base_port: config.network.rendezvous_base_port,
        timeout: Duration::from_secs(config.network.rendezvous_timeout_secs),
    };

    let (ok, peer_info) = rendezvous(rendezvous_config).await?;
    let Some(peer_info) = (if ok { peer_info } else { None }) else {
        tracing::warn!("rendezvous timed out without finding a peer");
        return Ok(());
    };

    let conn = depeche_store::open(db_path)?;
    let contact_id = depeche_store::queries::contacts::store_contact(&conn, &peer_info.alias, &peer_info.alias)?;
    let peer_key_id = depeche_store::queries::keys::store_contact_key(&conn, &peer_info.public_key)?;
    for address in &peer_info.address_pad {
        depeche_store::queries::addresses::store_contact_address(&conn, &contact_id, address, &peer_key_id)?;
    }
    identity::bind_pad_to_contact(&conn, &pad, &contact_id)?;

    tracing::info!(
        peer_alias = %peer_info.alias,
        pad_size = peer_info.address_pad.len(),
        "rendezvous completed"
    );
    Ok(())
}
