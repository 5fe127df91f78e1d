//! Shared error type for the depeche protocol engine (Section 7).

use thiserror::Error;

/// Errors surfaced anywhere in the protocol engine.
///
/// Recovery policy is documented per-variant; see the component that raises
/// each one for where it is handled versus propagated.
#[derive(Debug, Error)]
pub enum DepecheError {
    /// Segment header magic did not match `0xDE0EC0E1`. The connection is
    /// dropped; this must never be fatal to a listener.
    #[error("segment protocol mismatch")]
    ProtocolMismatch,

    /// Segment header version was not `0`.
    #[error("unsupported segment version: {0}")]
    UnsupportedVersion(u8),

    /// The peer closed the stream before a full segment was received.
    #[error("stream truncated before segment complete")]
    Truncated,

    /// A timeout elapsed on a socket operation.
    #[error("operation timed out")]
    Timeout,

    /// A decoded `type` discriminator did not match any known message kind.
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(String),

    /// A JSON payload failed to parse or was missing required fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Decryption or deserialization of a rendezvous payload failed under
    /// the shared secret.
    #[error("rendezvous authentication failed")]
    RendezvousAuth,

    /// No free port could be found within the configured offset range.
    #[error("no free port found near {base} (+{tried} offsets tried)")]
    PortExhausted { base: u16, tried: u16 },

    /// An integrity rule was violated by a store operation that the caller
    /// is expected to swallow at specific call sites (duplicate message id,
    /// key still referenced on removal).
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// A cryptographic operation failed (bad key, decryption failure, …).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The persistent store reported an error outside the conflict cases
    /// above.
    #[error("store error: {0}")]
    Store(String),
}

impl DepecheError {
    /// True for the two call sites spec.md §7 names as "swallowed":
    /// duplicate `store_message` ids and in-use `remove_own_key` failures.
    pub fn is_store_conflict(&self) -> bool {
        matches!(self, DepecheError::StoreConflict(_))
    }
}
