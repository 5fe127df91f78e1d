//! Wire messages (Section 3, Section 4.3, Section 6): the tagged union
//! exchanged once rendezvous has completed, plus the container that bundles
//! a run of them into one segment payload.

use crate::address::Address;
use crate::error::DepecheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// ISO-8601 with microsecond precision, as spec.md §4.3 requires.
mod ts_micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// One message in an exchange. The `type` tag and every variant's fields
/// sit flat in the same JSON object — see spec.md §6 for the exact shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DepecheMessage {
    #[serde(rename = "user_message")]
    UserMessage {
        exchange_ref: String,
        to_address: Address,
        #[serde(with = "ts_micros")]
        send_time: DateTime<Utc>,
        /// Base64 ciphertext, opaque to everything but the recipient's
        /// crypto provider.
        contents: String,
    },
    /// Flow control: "I will not read more from you." Receiver-initiated
    /// (spec.md §4.6, §9 REDESIGN FLAGS).
    #[serde(rename = "stop_sending")]
    StopSending { exchange_ref: String },
    /// Flow control: "I have nothing more to send."
    #[serde(rename = "no_more_data")]
    NoMoreData { exchange_ref: String },
}

const KNOWN_KINDS: [&str; 3] = ["user_message", "stop_sending", "no_more_data"];

impl DepecheMessage {
    pub fn exchange_ref(&self) -> &str {
        match self {
            DepecheMessage::UserMessage { exchange_ref, .. }
            | DepecheMessage::StopSending { exchange_ref }
            | DepecheMessage::NoMoreData { exchange_ref } => exchange_ref,
        }
    }

    pub fn new_user_message(to_address: Address, send_time: DateTime<Utc>, contents: String) -> Self {
        DepecheMessage::UserMessage {
            exchange_ref: Uuid::new_v4().to_string(),
            to_address,
            send_time,
            contents,
        }
    }

    pub fn new_stop_sending() -> Self {
        DepecheMessage::StopSending {
            exchange_ref: Uuid::new_v4().to_string(),
        }
    }

    pub fn new_no_more_data() -> Self {
        DepecheMessage::NoMoreData {
            exchange_ref: Uuid::new_v4().to_string(),
        }
    }

    /// Decode a single message object, failing with
    /// [`DepecheError::UnknownMessageKind`] for an unrecognized `type` tag
    /// rather than the generic parse error serde would otherwise produce.
    pub fn decode(value: &Value) -> Result<Self, DepecheError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DepecheError::MalformedPayload("missing type".into()))?;
        if !KNOWN_KINDS.contains(&kind) {
            return Err(DepecheError::UnknownMessageKind(kind.to_string()));
        }
        serde_json::from_value(value.clone()).map_err(|e| DepecheError::MalformedPayload(e.to_string()))
    }
}

/// Ordered sequence of messages exchanged as one bandwidth-amortization
/// unit; order is not semantically significant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageContainer(pub Vec<DepecheMessage>);

impl MessageContainer {
    pub fn new(messages: Vec<DepecheMessage>) -> Self {
        MessageContainer(messages)
    }

    pub fn single(message: DepecheMessage) -> Self {
        MessageContainer(vec![message])
    }

    /// Serialize as a plain JSON array of message objects (not
    /// double-encoded strings — spec.md §4.3).
    pub fn serialize(&self) -> String {
        serde_json::to_string(&self.0).expect("DepecheMessage serialization cannot fail")
    }

    pub fn deserialize(data: &str) -> Result<Self, DepecheError> {
        let values: Vec<Value> =
            serde_json::from_str(data).map_err(|e| DepecheError::MalformedPayload(e.to_string()))?;
        let messages = values
            .iter()
            .map(DepecheMessage::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MessageContainer(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_round_trips_flat() {
        let msg = DepecheMessage::new_user_message(Address::generate(), Utc::now(), "cGxhaW50ZXh0".into());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"user_message\""));
        assert!(!json.contains("user_message\":{"), "fields must sit flat, not nested");
        let back: DepecheMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn container_round_trips() {
        let container = MessageContainer::new(vec![
            DepecheMessage::new_no_more_data(),
            DepecheMessage::new_stop_sending(),
        ]);
        let wire = container.serialize();
        assert!(wire.starts_with('['));
        let back = MessageContainer::deserialize(&wire).unwrap();
        assert_eq!(container, back);
    }

    #[test]
    fn unknown_kind_is_rejected_explicitly() {
        let data = r#"[{"type":"frobnicate","exchange_ref":"x"}]"#;
        let err = MessageContainer::deserialize(data).unwrap_err();
        assert!(matches!(err, DepecheError::UnknownMessageKind(k) if k == "frobnicate"));
    }
}
