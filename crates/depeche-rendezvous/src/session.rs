//! The rendezvous session (Section 4.5): races a server role (accept) and a
//! chaser role (dial) against each other, sharing one "first writer wins"
//! completion slot and a [`CancellationToken`] that unblocks the loser as
//! soon as a winner is decided.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use depeche_discovery::{listen_announcements, send_announcement, ServerType};
use depeche_types::{DepecheError, RendezvousInfo};

use crate::handshake;

/// How many port offsets (base, base+1, ... ) the server role tries before
/// giving up (spec.md §4.5).
const PORT_SEARCH_ATTEMPTS: u16 = 10;

#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    pub callsign: String,
    pub own_info: RendezvousInfo,
    pub shared_secret: String,
    pub announce_port: u16,
    pub rendezvous_base_port: u16,
    pub timeout: Duration,
}

/// First-writer-wins completion: whichever role reaches `complete` first
/// gets its result delivered; the other's call is a silent no-op.
struct Completion {
    sender: Mutex<Option<oneshot::Sender<RendezvousInfo>>>,
}

impl Completion {
    fn new() -> (Arc<Self>, oneshot::Receiver<RendezvousInfo>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Completion {
                sender: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Returns `true` if this call was the one that won the race.
    fn complete(&self, info: RendezvousInfo) -> bool {
        let mut guard = self.sender.lock().expect("completion mutex poisoned");
        match guard.take() {
            Some(tx) => {
                let _ = tx.send(info);
                true
            }
            None => false,
        }
    }
}

/// Run one rendezvous attempt to completion or timeout. Returns
/// `(true, Some(peer_info))` on success and `(false, None)` if the
/// configured timeout elapses before either role completes.
pub async fn rendezvous(config: RendezvousConfig) -> Result<(bool, Option<RendezvousInfo>), DepecheError> {
    let (completion, rx) = Completion::new();
    let cancel = CancellationToken::new();

    let server_handle = tokio::spawn(server_role(config.clone(), completion.clone(), cancel.clone()));
    let chaser_handle = tokio::spawn(chaser_role(config.clone(), completion.clone(), cancel.clone()));

    let outcome = tokio::time::timeout(config.timeout, rx).await;
    cancel.cancel();
    // Cancellation is cooperative, but a role already blocked inside a raw
    // `handshake::dial`/`accept` read/write won't observe `cancel` until
    // that I/O call returns — which may be never, if the peer stops
    // responding mid-handshake. Abort rather than await so a stuck peer
    // can't keep this function from returning once the budget is spent.
    server_handle.abort();
    chaser_handle.abort();

    match outcome {
        Ok(Ok(peer_info)) => Ok((true, Some(peer_info))),
        _ => Ok((false, None)),
    }
}

async fn bind_rendezvous_listener(base_port: u16) -> Option<(TcpListener, u16)> {
    for offset in 0..PORT_SEARCH_ATTEMPTS {
        let port = base_port.wrapping_add(offset);
        if let Ok(listener) = TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, port)).await {
            return Some((listener, port));
        }
    }
    None
}

async fn server_role(config: RendezvousConfig, completion: Arc<Completion>, cancel: CancellationToken) {
    let Some((listener, bound_port)) = bind_rendezvous_listener(config.rendezvous_base_port).await else {
        tracing::warn!(
            base = config.rendezvous_base_port,
            tried = PORT_SEARCH_ATTEMPTS,
            "rendezvous server role found no free port"
        );
        return;
    };

    if let Err(e) = send_announcement(
        config.announce_port,
        ServerType::Rendezvous,
        bound_port,
        &config.callsign,
    )
    .await
    {
        tracing::warn!(error = %e, "failed to broadcast rendezvous announcement");
        return;
    }

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = listener.accept() => result,
        };

        let (mut stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "rendezvous accept failed");
                continue;
            }
        };

        match handshake::accept(&mut stream, &config.own_info, &config.shared_secret).await {
            Ok(peer_info) => {
                if completion.complete(peer_info) {
                    cancel.cancel();
                }
                return;
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "rendezvous handshake failed");
            }
        }
    }
}

async fn chaser_role(config: RendezvousConfig, completion: Arc<Completion>, cancel: CancellationToken) {
    let listen_cancel = CancellationToken::new();
    let heard: Arc<Mutex<Option<(IpAddr, u16)>>> = Arc::new(Mutex::new(None));

    let heard_in_closure = heard.clone();
    let listen_cancel_in_closure = listen_cancel.clone();
    let listen_fut = listen_announcements(
        config.announce_port,
        ServerType::Rendezvous,
        &config.callsign,
        None,
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
            return;
        }
        _ = listen_fut => {}
    }

    if cancel.is_cancelled() {
        return;
    }

    let target = *heard.lock().expect("heard mutex poisoned");
    let Some((ip, port)) = target else {
        return;
    };

    let mut stream = match TcpStream::connect((ip, port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "failed to dial rendezvous peer");
            return;
        }
    };

    match handshake::dial(&mut stream, &config.own_info, &config.shared_secret).await {
        Ok(peer_info) => {
            if completion.complete(peer_info) {
                cancel.cancel();
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "rendezvous handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depeche_types::Address;

    fn config(callsign: &str, alias: &str, announce_port: u16, base_port: u16) -> RendezvousConfig {
        RendezvousConfig {
            callsign: callsign.to_string(),
            own_info: RendezvousInfo::new(
                alias,
                (0..3).map(|_| Address::generate()).collect(),
                format!("pk-{alias}"),
            ),
            shared_secret: "a really secret secret".to_string(),
            announce_port,
            rendezvous_base_port: base_port,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn two_peers_rendezvous_and_exchange_info() {
        let announce_port = free_udp_port().await;
        let alpha_cfg = config("alpha", "alpha", announce_port, 29000);
        let beta_cfg = config("beta", "beta", announce_port, 29100);

        let (alpha_result, beta_result) = tokio::join!(rendezvous(alpha_cfg.clone()), rendezvous(beta_cfg.clone()));

        let (alpha_ok, alpha_peer) = alpha_result.unwrap();
        let (beta_ok, beta_peer) = beta_result.unwrap();

        assert!(alpha_ok);
        assert!(beta_ok);
        assert_eq!(alpha_peer.unwrap().alias, "beta");
        assert_eq!(beta_peer.unwrap().alias, "alpha");
    }

    #[tokio::test]
    async fn no_peer_times_out_without_error() {
        let announce_port = free_udp_port().await;
        let mut cfg = config("solo", "solo", announce_port, 29200);
        cfg.timeout = Duration::from_millis(200);

        let (ok, peer) = rendezvous(cfg).await.unwrap();
        assert!(!ok);
        assert!(peer.is_none());
    }

    #[tokio::test]
    async fn stuck_peer_connection_does_not_block_timeout() {
        // A peer that opens the rendezvous TCP connection and then never
        // writes a byte must not prevent `rendezvous` from returning once
        // its wall-clock budget is spent — regression test for the
        // cancellation-vs-abort gap described in session.rs's `rendezvous`.
        let announce_port = free_udp_port().await;
        let base_port = 29250;
        let mut cfg = config("solo", "solo", announce_port, base_port);
        cfg.timeout = Duration::from_millis(300);

        // Give the server role a moment to bind and announce, then connect
        // without sending anything and hold the socket open past the
        // configured timeout.
        let stray = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let stream = TcpStream::connect((std::net::Ipv4Addr::LOCALHOST, base_port)).await;
            if let Ok(stream) = stream {
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(stream);
            }
        });

        let result = tokio::time::timeout(Duration::from_secs(2), rendezvous(cfg)).await;
        let (ok, peer) = result.expect("rendezvous must return promptly despite the stuck peer").unwrap();
        assert!(!ok);
        assert!(peer.is_none());
        stray.abort();
    }

    async fn free_udp_port() -> u16 {
        let socket = tokio::net::UdpSocket::bind((std::net::Ipv4Addr::UNSPECIFIED, 0))
            .await
            .unwrap();
        socket.local_addr().unwrap().port()
    }
}
