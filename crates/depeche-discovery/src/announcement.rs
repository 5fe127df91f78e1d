//! Service announcements: the `depeche_ipadapter` UDP broadcast envelope
//! (Section 4.4, Section 6) that lets a node advertise a rendezvous or
//! exchange server to the local broadcast domain.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use depeche_types::DepecheError;

const PROTOCOL: &str = "depeche_ipadapter";
const PROTOCOL_VERSION: u8 = 0;
const OPERATION: &str = "server_announcement";

/// Datagrams are discarded unread past this size; spec.md §4.4 notes 8 KiB
/// suffices for any legitimate announcement.
const MAX_DATAGRAM_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    Rendezvous,
    Exchange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnnouncementContent {
    server_type: ServerType,
    server_port: u16,
    callsign: String,
}

/// One `server_announcement` envelope, as it sits on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    protocol: String,
    version: u8,
    operation: String,
    content: AnnouncementContent,
}

impl Announcement {
    fn new(server_type: ServerType, server_port: u16, callsign: String) -> Self {
        Announcement {
            protocol: PROTOCOL.to_string(),
            version: PROTOCOL_VERSION,
            operation: OPERATION.to_string(),
            content: AnnouncementContent {
                server_type,
                server_port,
                callsign,
            },
        }
    }

    pub fn server_type(&self) -> ServerType {
        self.content.server_type
    }

    pub fn server_port(&self) -> u16 {
        self.content.server_port
    }

    pub fn callsign(&self) -> &str {
        &self.content.callsign
    }

    /// Parse a received datagram, rejecting anything that isn't a
    /// recognized `server_announcement` of our protocol and version. These
    /// mismatches are the listener's problem to log and skip, never fatal.
    fn parse(data: &[u8]) -> Result<Self, DepecheError> {
        let announcement: Announcement =
            serde_json::from_slice(data).map_err(|e| DepecheError::MalformedPayload(e.to_string()))?;
        if announcement.protocol != PROTOCOL {
            return Err(DepecheError::ProtocolMismatch);
        }
        if announcement.version != PROTOCOL_VERSION {
            return Err(DepecheError::UnsupportedVersion(announcement.version));
        }
        if announcement.operation != OPERATION {
            return Err(DepecheError::MalformedPayload(format!(
                "unexpected operation {:?}",
                announcement.operation
            )));
        }
        Ok(announcement)
    }
}

async fn bind_broadcast_socket(port: u16) -> Result<UdpSocket, DepecheError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// Broadcast one `server_announcement` for `server_type` advertising
/// `server_port`, identified by `callsign`, on `announce_port` (default
/// 27272).
pub async fn send_announcement(
    announce_port: u16,
    server_type: ServerType,
    server_port: u16,
    callsign: &str,
) -> Result<(), DepecheError> {
    let announcement = Announcement::new(server_type, server_port, callsign.to_string());
    let payload = serde_json::to_vec(&announcement).expect("announcement serialization cannot fail");

    let socket = bind_broadcast_socket(0).await?;
    let dest = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), announce_port);
    socket.send_to(&payload, dest).await?;
    tracing::debug!(callsign, server_port, ?server_type, "sent announcement");
    Ok(())
}

/// Listen on `announce_port` for `server_announcement`s of `server_type`,
/// invoking `on_match(ip, port, callsign)` for each one whose callsign
/// differs from `own_callsign` (self-echo is dropped silently). Returns
/// once `timeout` elapses (`None` means listen until cancelled) or `cancel`
/// is triggered.
pub async fn listen_announcements<F>(
    announce_port: u16,
    server_type: ServerType,
    own_callsign: &str,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    mut on_match: F,
) -> Result<(), DepecheError>
where
    F: FnMut(IpAddr, u16, &str),
{
    let socket = bind_broadcast_socket(announce_port).await?;
    let deadline = timeout.map(|d| Instant::now() + d);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let recv_fut = socket.recv_from(&mut buf);

        let (len, from) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("announcement listener cancelled");
                return Ok(());
            }
            _ = sleep_until_deadline(deadline) => {
                tracing::debug!("announcement listener timed out");
                return Ok(());
            }
            result = recv_fut => result?,
        };

        let announcement = match Announcement::parse(&buf[..len]) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "discarding malformed announcement");
                continue;
            }
        };

        if announcement.server_type() != server_type {
            continue;
        }
        if announcement.callsign() == own_callsign {
            continue;
        }

        on_match(from.ip(), announcement.server_port(), announcement.callsign());
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn announcement_round_trips_through_json() {
        let announcement = Announcement::new(ServerType::Rendezvous, 27273, "callsign-1".into());
        let json = serde_json::to_string(&announcement).unwrap();
        assert!(json.contains("\"protocol\":\"depeche_ipadapter\""));
        assert!(json.contains("\"operation\":\"server_announcement\""));
        let back = Announcement::parse(json.as_bytes()).unwrap();
        assert_eq!(back.server_port(), 27273);
        assert_eq!(back.callsign(), "callsign-1");
    }

    #[test]
    fn rejects_wrong_protocol() {
        let data = br#"{"protocol":"not_depeche","version":0,"operation":"server_announcement","content":{"server_type":"rendezvous","server_port":1,"callsign":"x"}}"#;
        assert!(matches!(Announcement::parse(data), Err(DepecheError::ProtocolMismatch)));
    }

    #[test]
    fn rejects_wrong_version() {
        let data = br#"{"protocol":"depeche_ipadapter","version":9,"operation":"server_announcement","content":{"server_type":"rendezvous","server_port":1,"callsign":"x"}}"#;
        assert!(matches!(Announcement::parse(data), Err(DepecheError::UnsupportedVersion(9))));
    }

    #[tokio::test]
    async fn listener_drops_self_echo() {
        let port = free_udp_port().await;
        let cancel = CancellationToken::new();
        let heard = Arc::new(Mutex::new(Vec::new()));
        let heard_clone = heard.clone();
        let cancel_clone = cancel.clone();

        let listener = tokio::spawn(async move {
            listen_announcements(port, ServerType::Exchange, "self", None, cancel_clone, |ip, p, cs| {
                heard_clone.lock().unwrap().push((ip, p, cs.to_string()));
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        send_announcement(port, ServerType::Exchange, 1234, "self").await.unwrap();
        send_announcement(port, ServerType::Exchange, 5678, "other").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        listener.await.unwrap().unwrap();

        let heard = heard.lock().unwrap();
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].1, 5678);
        assert_eq!(heard[0].2, "other");
    }

    async fn free_udp_port() -> u16 {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.unwrap();
        socket.local_addr().unwrap().port()
    }
}
