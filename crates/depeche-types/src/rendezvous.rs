//! `RendezvousInfo` — the payload exchanged during the authenticated
//! rendezvous handshake (Section 3, Section 6).

use crate::address::Address;
use crate::error::DepecheError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const WIRE_TYPE: &str = "rendezvous_info";

/// Produced once per rendezvous attempt; consumed by both sides to
/// populate their stores with an address pad and the peer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendezvousInfo {
    pub alias: String,
    pub address_pad: Vec<Address>,
    pub public_key: String,
}

impl RendezvousInfo {
    pub fn new(alias: impl Into<String>, address_pad: Vec<Address>, public_key: impl Into<String>) -> Self {
        RendezvousInfo {
            alias: alias.into(),
            address_pad,
            public_key: public_key.into(),
        }
    }

    /// Serialize to the wire shape: `{"type":"rendezvous_info", ...}`.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "type": WIRE_TYPE,
            "alias": self.alias,
            "address_pad": self.address_pad,
            "public_key": self.public_key,
        })
        .to_string()
    }

    /// Parse and validate the wire shape, rejecting anything whose `type`
    /// tag doesn't match or that's missing a required field.
    pub fn from_json(data: &str) -> Result<Self, DepecheError> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| DepecheError::MalformedPayload(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DepecheError::MalformedPayload("missing type".into()))?;
        if kind != WIRE_TYPE {
            return Err(DepecheError::MalformedPayload(format!(
                "expected type {WIRE_TYPE}, got {kind}"
            )));
        }

        serde_json::from_value(value).map_err(|e| DepecheError::MalformedPayload(e.to_string()))
    }
}
