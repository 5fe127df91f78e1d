//! Long-lived exchange workers (Section 5): the exchange server (advertise
//! + accept, one connection at a time) and the exchange dialer (listen for
//! an announcement, connect, run one exchange), wired to the store so
//! stored messages actually move between peers.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use depeche_discovery::{listen_announcements, send_announcement, ServerType};
use depeche_exchange::{run_exchange, UserMessagePayload};
use depeche_types::{Address, DepecheError};

use crate::config::NetworkConfig;

/// How many port offsets the exchange server tries before giving up —
/// mirrors the rendezvous server's port search (spec.md §4.5, §6).
const PORT_SEARCH_ATTEMPTS: u16 = 10;
/// How often the exchange server re-broadcasts its announcement while
/// advertising.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);
/// How long the dialer listens for one exchange announcement before
/// looping back around (so it keeps observing `cancel`).
const DIALER_LISTEN_WINDOW: Duration = Duration::from_secs(5);

async fn bind_port_search(base_port: u16) -> Option<(TcpListener, u16)> {
    for offset in 0..PORT_SEARCH_ATTEMPTS {
        let port = base_port.wrapping_add(offset);
        if let Ok(listener) = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            return Some((listener, port));
        }
    }
    None
}

/// Outbound messages ready to forward: stored messages under the forward
/// cap, drawn once per connection and handed out in order. Drawing a
/// message from the queue immediately increments its forward count — that
/// is the "attempt to forward" the counter tracks (spec.md §9 REDESIGN
/// FLAGS, SPEC_FULL.md §4.6), not receipt.
struct ForwardQueue {
    db_path: PathBuf,
    pending: Vec<(String, UserMessagePayload)>,
}

impl ForwardQueue {
    fn new(db_path: PathBuf, forward_cap: u32) -> Result<Self, DepecheError> {
        let conn = depeche_store::open(&db_path)?;
        let messages = depeche_store::queries::messages::messages_to_forward(&conn, forward_cap)?;
        let pending = messages
            .into_iter()
            .map(|m| {
                (
                    m.id,
                    UserMessagePayload {
                        to_address: m.header_address,
                        send_time: m.header_sent_at,
                        contents: m.contents,
                    },
                )
            })
            .collect();
        Ok(ForwardQueue { db_path, pending })
    }

    fn next(&mut self) -> Option<UserMessagePayload> {
        let (id, payload) = self.pending.pop()?;
        if let Ok(conn) = depeche_store::open(&self.db_path) {
            if let Err(e) = depeche_store::queries::messages::increment_forward_count(&conn, &id) {
                tracing::warn!(id, error = %e, "failed to record forward attempt");
            }
        }
        Some(payload)
    }
}

fn receive_into_store(db_path: &Path, payload: UserMessagePayload) -> Result<(), DepecheError> {
    let conn = depeche_store::open(db_path)?;
    let id = depeche_store::queries::messages::store_message(&conn, &payload.to_address, payload.send_time, &payload.contents)?;
    if depeche_store::queries::addresses::is_own_unused_address(&conn, &payload.to_address)? {
        depeche_store::queries::addresses::mark_own_address_used(&conn, &payload.to_address)?;
    }
    tracing::info!(id, to = %payload.to_address, "stored inbound message");
    Ok(())
}

/// Run one exchange over `stream` to completion, wiring its outbound
/// source and inbound callback to the store at `db_path`.
async fn serve_connection(
    stream: &mut TcpStream,
    start_sending: bool,
    db_path: PathBuf,
    forward_cap: u32,
) -> Result<(), DepecheError> {
    let mut queue = ForwardQueue::new(db_path.clone(), forward_cap)?;
    run_exchange(
        stream,
        start_sending,
        move || queue.next(),
        move |payload| receive_into_store(&db_path, payload),
    )
    .await
}

/// Advertise an exchange server and serve connections, one at a time,
/// until `cancel` fires.
pub async fn run_exchange_server(
    db_path: PathBuf,
    network: NetworkConfig,
    callsign: String,
    cancel: CancellationToken,
) {
    let Some((listener, port)) = bind_port_search(network.exchange_base_port).await else {
        tracing::warn!(
            base = network.exchange_base_port,
            tried = PORT_SEARCH_ATTEMPTS,
            "exchange server found no free port"
        );
        return;
    };
    tracing::info!(port, "exchange server listening");

    let announce_port = network.announce_port;
    let announcer_cancel = cancel.clone();
    let announcer_callsign = callsign.clone();
    let announcer = tokio::spawn(async move {
        loop {
            if let Err(e) = send_announcement(announce_port, ServerType::Exchange, port, &announcer_callsign).await {
                tracing::warn!(error = %e, "failed to broadcast exchange announcement");
            }
            tokio::select! {
                biased;
                _ = announcer_cancel.cancelled() => return,
                _ = tokio::time::sleep(ANNOUNCE_INTERVAL) => {}
            }
        }
    });

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        let (mut stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "exchange accept failed");
                continue;
            }
        };

        tracing::info!(peer = %peer_addr, "accepted exchange connection");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = serve_connection(&mut stream, false, db_path.clone(), network.forward_cap) => result,
        };
        if let Err(e) = outcome {
            tracing::warn!(peer = %peer_addr, error = %e, "exchange connection failed");
        }
    }

    announcer.abort();
}

/// Listen for exchange announcements and dial each one in turn, running
/// one exchange per heard announcement, until `cancel` fires.
pub async fn run_exchange_dialer(
    db_path: PathBuf,
    network: NetworkConfig,
    callsign: String,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let Some((ip, port)) = listen_for_one(&network, &callsign, cancel.clone()).await else {
            continue;
        };

        tracing::info!(%ip, port, "dialing heard exchange announcement");
        let mut stream = match TcpStream::connect((ip, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "failed to dial exchange peer");
                continue;
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = serve_connection(&mut stream, true, db_path.clone(), network.forward_cap) => result,
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "exchange connection failed");
        }
    }
}

async fn listen_for_one(
    network: &NetworkConfig,
    callsign: &str,
    cancel: CancellationToken,
) -> Option<(IpAddr, u16)> {
    let listen_cancel = CancellationToken::new();
    let heard: Arc<Mutex<Option<(IpAddr, u16)>>> = Arc::new(Mutex::new(None));

    let heard_in_closure = heard.clone();
    let listen_cancel_in_closure = listen_cancel.clone();
    let listen_fut = listen_announcements(
        network.announce_port,
        ServerType::Exchange,
        callsign,
        Some(DIALER_LISTEN_WINDOW),
        listen_cancel.clone(),
        move |ip, port, _callsign| {
            let mut guard = heard_in_closure.lock().expect("heard mutex poisoned");
            if guard.is_none() {
                *guard = Some((ip, port));
                listen_cancel_in_closure.cancel();
            }
        },
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            listen_cancel.cancel();
        }
        _ = listen_fut => {}
    }

    heard.lock().expect("heard mutex poisoned").take()
}

/// Compose and queue an outbound message to `to_address`, sealed under
/// `public_key`, for pickup by the next exchange send-phase.
pub fn queue_outbound_message(
    db_path: &Path,
    to_address: &Address,
    public_key: &str,
    plaintext: &str,
) -> Result<String, DepecheError> {
    let sealed = depeche_crypto::sealed_encrypt(plaintext.as_bytes(), public_key)
        .map_err(|e| DepecheError::Crypto(e.to_string()))?;
    let conn = depeche_store::open(db_path)?;
    depeche_store::queries::messages::store_message(&conn, to_address, Utc::now(), &sealed)
}
