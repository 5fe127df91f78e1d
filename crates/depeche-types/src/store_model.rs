//! Types read back from the address & key store (Section 3, Section 4.7).

use chrono::{DateTime, Utc};

use crate::address::Address;

/// A message read from persistent storage. A superset of `UserMessage`:
/// carries bookkeeping (when first/last seen, how many times forwarded)
/// that never travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// `SHA-256(contents)`, hex-encoded — content-addressed so replays
    /// from gossip are idempotent.
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub forward_count: u32,
    pub header_address: Address,
    pub header_sent_at: DateTime<Utc>,
    pub contents: String,
}

/// A known contact: a peer this node has rendezvoused with or otherwise
/// exchanged an address pad with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub contact_id: String,
    pub nickname: String,
    pub alias: String,
    pub created_at: DateTime<Utc>,
}
