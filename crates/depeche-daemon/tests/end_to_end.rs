//! End-to-end scenarios from spec.md §8: two nodes rendezvousing over a
//! shared secret (S2) and exchanging queued messages in both directions
//! (S4), driven through the same `depeche_daemon` commands the `depeched`
//! binary calls.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use depeche_daemon::commands::start::run_rendezvous;
use depeche_daemon::config::{DaemonConfig, IdentityConfig, NetworkConfig, StorageConfig};
use depeche_daemon::worker;
use depeche_types::Address;

const SHARED_SECRET: &str = "a really secret secret";

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("depeche-e2e-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn free_udp_port() -> u16 {
    let socket = tokio::net::UdpSocket::bind(("0.0.0.0", 0)).await.unwrap();
    socket.local_addr().unwrap().port()
}

fn node_config(alias: &str, callsign: &str, data_dir: PathBuf, announce_port: u16, rendezvous_base: u16, exchange_base: u16) -> DaemonConfig {
    DaemonConfig {
        identity: IdentityConfig {
            callsign: callsign.to_string(),
            alias: alias.to_string(),
        },
        network: NetworkConfig {
            announce_port,
            rendezvous_base_port: rendezvous_base,
            exchange_base_port: exchange_base,
            rendezvous_timeout_secs: 5,
            forward_cap: 3,
        },
        storage: StorageConfig {
            data_dir: data_dir.to_string_lossy().into_owned(),
        },
    }
}

/// S2: two nodes rendezvous over a shared secret and end up with each
/// other's address pad and public key on file.
#[tokio::test]
async fn two_party_rendezvous_populates_both_stores() {
    let announce_port = free_udp_port().await;
    let alpha_dir = temp_dir("alpha-rdv");
    let beta_dir = temp_dir("beta-rdv");
    let alpha_db = alpha_dir.join("depeche.db");
    let beta_db = beta_dir.join("depeche.db");

    let alpha_config = node_config("alpha", "alpha-callsign", alpha_dir, announce_port, 29300, 29400);
    let beta_config = node_config("beta", "beta-callsign", beta_dir, announce_port, 29500, 29600);

    depeche_store::open(&alpha_db).unwrap();
    depeche_store::open(&beta_db).unwrap();

    let (alpha_result, beta_result) = tokio::join!(
        run_rendezvous(&alpha_db, &alpha_config, SHARED_SECRET),
        run_rendezvous(&beta_db, &beta_config, SHARED_SECRET),
    );
    alpha_result.unwrap();
    beta_result.unwrap();

    let alpha_conn = depeche_store::open(&alpha_db).unwrap();
    let alpha_contacts = depeche_store::queries::contacts::get_contacts(&alpha_conn).unwrap();
    assert_eq!(alpha_contacts.len(), 1);
    assert_eq!(alpha_contacts[0].nickname, "beta");
    let alpha_pad = depeche_store::queries::addresses::address_pad_for(&alpha_conn, &alpha_contacts[0].contact_id, None).unwrap();
    assert_eq!(alpha_pad.len(), 20, "alpha should hold beta's full address pad");

    let beta_conn = depeche_store::open(&beta_db).unwrap();
    let beta_contacts = depeche_store::queries::contacts::get_contacts(&beta_conn).unwrap();
    assert_eq!(beta_contacts.len(), 1);
    assert_eq!(beta_contacts[0].nickname, "alpha");
    let beta_pad = depeche_store::queries::addresses::address_pad_for(&beta_conn, &beta_contacts[0].contact_id, None).unwrap();
    assert_eq!(beta_pad.len(), 20, "beta should hold alpha's full address pad");
}

/// A rendezvous under mismatched secrets leaves no contact behind on either
/// side — the negative-path complement to S2.
#[tokio::test]
async fn mismatched_secret_leaves_no_contact() {
    let announce_port = free_udp_port().await;
    let alpha_dir = temp_dir("alpha-badsecret");
    let beta_dir = temp_dir("beta-badsecret");
    let alpha_db = alpha_dir.join("depeche.db");
    let beta_db = beta_dir.join("depeche.db");

    let mut alpha_config = node_config("alpha", "alpha-cs2", alpha_dir, announce_port, 29700, 29800);
    alpha_config.network.rendezvous_timeout_secs = 1;
    let mut beta_config = node_config("beta", "beta-cs2", beta_dir, announce_port, 29900, 30000);
    beta_config.network.rendezvous_timeout_secs = 1;

    depeche_store::open(&alpha_db).unwrap();
    depeche_store::open(&beta_db).unwrap();

    let (alpha_result, beta_result) = tokio::join!(
        run_rendezvous(&alpha_db, &alpha_config, "secret-one"),
        run_rendezvous(&beta_db, &beta_config, "secret-two"),
    );
    alpha_result.unwrap();
    beta_result.unwrap();

    let alpha_conn = depeche_store::open(&alpha_db).unwrap();
    assert!(depeche_store::queries::contacts::get_contacts(&alpha_conn).unwrap().is_empty());
    let beta_conn = depeche_store::open(&beta_db).unwrap();
    assert!(depeche_store::queries::contacts::get_contacts(&beta_conn).unwrap().is_empty());
}

/// S4: a message queued on each side is delivered to the other exactly
/// once after one exchange connection.
#[tokio::test]
async fn exchange_delivers_queued_messages_both_directions() {
    let announce_port = free_udp_port().await;
    let alpha_dir = temp_dir("alpha-exch");
    let beta_dir = temp_dir("beta-exch");
    let alpha_db = alpha_dir.join("depeche.db");
    let beta_db = beta_dir.join("depeche.db");

    let alpha_config = node_config("alpha", "alpha-exch-cs", alpha_dir, announce_port, 30100, 30200);
    let beta_config = node_config("beta", "beta-exch-cs", beta_dir, announce_port, 30300, 30400);

    depeche_store::open(&alpha_db).unwrap();
    depeche_store::open(&beta_db).unwrap();

    let (_alpha_sk, alpha_pk) = depeche_crypto::generate_keypair();
    let (_beta_sk, beta_pk) = depeche_crypto::generate_keypair();
    let addr_for_beta = Address::generate();
    let addr_for_alpha = Address::generate();

    worker::queue_outbound_message(&alpha_db, &addr_for_beta, &beta_pk, "hello from alpha").unwrap();
    worker::queue_outbound_message(&beta_db, &addr_for_alpha, &alpha_pk, "hello from beta").unwrap();

    let cancel = CancellationToken::new();
    let server = tokio::spawn(worker::run_exchange_server(
        alpha_db.clone(),
        alpha_config.network.clone(),
        alpha_config.identity.callsign.clone(),
        cancel.clone(),
    ));
    let dialer = tokio::spawn(worker::run_exchange_dialer(
        beta_db.clone(),
        beta_config.network.clone(),
        beta_config.identity.callsign.clone(),
        cancel.clone(),
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let beta_conn = depeche_store::open(&beta_db).unwrap();
        let alpha_conn = depeche_store::open(&alpha_db).unwrap();
        let beta_count: i64 = beta_conn
            .query_row("SELECT COUNT(*) FROM message", [], |r| r.get(0))
            .unwrap();
        let alpha_count: i64 = alpha_conn
            .query_row("SELECT COUNT(*) FROM message", [], |r| r.get(0))
            .unwrap();
        if beta_count >= 2 && alpha_count >= 2 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("exchange did not complete in time (alpha={alpha_count}, beta={beta_count})");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    cancel.cancel();
    let _ = server.await;
    let _ = dialer.await;

    let beta_conn = depeche_store::open(&beta_db).unwrap();
    let beta_received = depeche_store::queries::messages::messages_to_forward(&beta_conn, 100).unwrap();
    assert!(beta_received.iter().any(|m| m.header_address == addr_for_beta));

    let alpha_conn = depeche_store::open(&alpha_db).unwrap();
    let alpha_received = depeche_store::queries::messages::messages_to_forward(&alpha_conn, 100).unwrap();
    assert!(alpha_received.iter().any(|m| m.header_address == addr_for_alpha));
}
