//! The user-message body convention (spec.md §6): a minimal multipart
//! envelope carrying a plaintext body plus optional protocol attachments
//! — a request for more addresses, or a pad of addresses handed over in
//! reply. This sits *inside* a sealed-box-encrypted `UserMessage.contents`;
//! the exchange and rendezvous layers never look inside it.
//!
//! The original ships this as a handful of stdlib `email.message.EmailMessage`
//! calls plus two small JSON-serializable structs
//! (`NodeIntercom.AddressPad`, `NodeIntercom.AddressPadRequest`). Nothing in
//! the depeche wire format needs general MIME interoperability — only this
//! node's own crypto layer ever reads a body back — so the envelope here is
//! a small boundary-delimited format of our own rather than a pulled-in MIME
//! parser.

use serde::{Deserialize, Serialize};

use depeche_types::{Address, DepecheError};

/// `Content-Description` tag for an address-pad request part.
pub const ADDRESS_PAD_REQUEST_DESCRIPTION: &str = "depeche/address_pad_request";
/// `Content-Description` tag for an address-pad part.
pub const ADDRESS_PAD_DESCRIPTION: &str = "depeche/address_pad";

const BOUNDARY: &str = "==depeche-body-boundary==";

/// "Please send me more addresses" — attached to an outgoing message when
/// this node's pad toward a contact is running low.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPadRequest {
    pub size: u32,
}

/// One key's worth of addresses in a pad handover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    pub public_key: String,
    pub addresses: Vec<Address>,
}

/// A fresh block of addresses, handed to a contact so they have somewhere
/// new to write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPad {
    pub from_alias: String,
    pub key_mappings: Vec<KeyMapping>,
}

/// A composed (or parsed) user-message body: a plaintext part plus the two
/// optional protocol attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessageBody {
    pub to_nickname: String,
    pub from_alias: String,
    pub text: String,
    pub address_pad_request: Option<AddressPadRequest>,
    pub address_pad: Option<AddressPad>,
}

struct Part {
    content_type: &'static str,
    content_description: Option<&'static str>,
    body: String,
}

/// Render `body` into the wire envelope that gets sealed-box encrypted as
/// `UserMessage.contents`.
pub fn compose(body: &UserMessageBody) -> String {
    let mut parts = vec![Part {
        content_type: "text/plain",
        content_description: None,
        body: body.text.clone(),
    }];

    if let Some(req) = &body.address_pad_request {
        parts.push(Part {
            content_type: "application/json",
            content_description: Some(ADDRESS_PAD_REQUEST_DESCRIPTION),
            body: serde_json::to_string(req).expect("AddressPadRequest serialization cannot fail"),
        });
    }

    if let Some(pad) = &body.address_pad {
        parts.push(Part {
            content_type: "application/json",
            content_description: Some(ADDRESS_PAD_DESCRIPTION),
            body: serde_json::to_string(pad).expect("AddressPad serialization cannot fail"),
        });
    }

    let mut out = format!("To: {}\nFrom: {}\n\n", body.to_nickname, body.from_alias);
    for part in &parts {
        out.push_str("--");
        out.push_str(BOUNDARY);
        out.push('\n');
        out.push_str("Content-Type: ");
        out.push_str(part.content_type);
        out.push('\n');
        if let Some(description) = part.content_description {
            out.push_str("Content-Description: ");
            out.push_str(description);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&part.body);
        out.push('\n');
    }
    out.push_str("--");
    out.push_str(BOUNDARY);
    out.push_str("--\n");
    out
}

/// Parse an envelope produced by [`compose`]. Unrecognized
/// `Content-Description` values are ignored (forward compatibility with a
/// future protocol attachment kind), not rejected.
pub fn parse(raw: &str) -> Result<UserMessageBody, DepecheError> {
    let (header, rest) = raw
        .split_once("\n\n")
        .ok_or_else(|| DepecheError::MalformedPayload("message body missing header block".into()))?;

    let mut to_nickname = None;
    let mut from_alias = None;
    for line in header.lines() {
        if let Some(value) = line.strip_prefix("To: ") {
            to_nickname = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("From: ") {
            from_alias = Some(value.to_string());
        }
    }
    let to_nickname =
        to_nickname.ok_or_else(|| DepecheError::MalformedPayload("message body missing To header".into()))?;
    let from_alias =
        from_alias.ok_or_else(|| DepecheError::MalformedPayload("message body missing From header".into()))?;

    let delimiter = format!("--{BOUNDARY}");
    let mut text = None;
    let mut address_pad_request = None;
    let mut address_pad = None;

    for chunk in rest.split(&delimiter) {
        let chunk = chunk.trim_matches('\n');
        if chunk.is_empty() || chunk == "--" {
            continue;
        }
        let Some((part_header, part_body)) = chunk.split_once("\n\n") else {
            continue;
        };

        let mut content_type = "";
        let mut content_description = None;
        for line in part_header.lines() {
            if let Some(value) = line.strip_prefix("Content-Type: ") {
                content_type = value;
            } else if let Some(value) = line.strip_prefix("Content-Description: ") {
                content_description = Some(value);
            }
        }

        match (content_type, content_description) {
            ("application/json", Some(ADDRESS_PAD_REQUEST_DESCRIPTION)) => {
                address_pad_request = Some(
                    serde_json::from_str(part_body)
                        .map_err(|e| DepecheError::MalformedPayload(e.to_string()))?,
                );
            }
            ("application/json", Some(ADDRESS_PAD_DESCRIPTION)) => {
                address_pad = Some(
                    serde_json::from_str(part_body)
                        .map_err(|e| DepecheError::MalformedPayload(e.to_string()))?,
                );
            }
            ("application/json", Some(_)) => {
                // Unknown protocol attachment kind: ignore, don't fail the parse.
            }
            _ => {
                if text.is_none() {
                    text = Some(part_body.to_string());
                }
            }
        }
    }

    let text = text.unwrap_or_default();

    Ok(UserMessageBody {
        to_nickname,
        from_alias,
        text,
        address_pad_request,
        address_pad,
    })
}
