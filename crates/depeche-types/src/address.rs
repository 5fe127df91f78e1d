//! Addresses and key records (Section 3).
//!
//! An address is the sole routing identity in depeche: opaque, single-use,
//! and bound to exactly one key for its whole lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An opaque, single-use destination address, `ADR-<uuid>` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    const PREFIX: &'static str = "ADR-";

    /// Mint a fresh, random address.
    pub fn generate() -> Self {
        Address(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Wrap an already-formatted address string (e.g. one read off the
    /// wire or out of storage). Does not validate the `ADR-` prefix —
    /// callers that need strict validation should use
    /// [`Address::parse`].
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Address(raw.into())
    }

    /// Parse and validate an address string received from a peer.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(Self::PREFIX)?;
        Uuid::parse_str(rest).ok()?;
        Some(Address(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

/// Internal identifier for a key record in the store. Never sent over the
/// wire — only the serialized public (and, for own keys, private) key
/// material is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn generate() -> Self {
        KeyId(Uuid::new_v4().to_string())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        KeyId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key record: own keys carry both halves, foreign (contact) keys carry
/// only the public half.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub key_id: KeyId,
    pub is_own: bool,
    pub private_key: Option<String>,
    pub public_key: String,
}
