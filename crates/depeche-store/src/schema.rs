//! SQL schema (Section 4.7), modeled directly on the five original tables.

/// Complete schema for depeche store v1.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS contact (
    id           TEXT PRIMARY KEY,
    nickname     TEXT NOT NULL,
    alias        TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    modified_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nacl_key (
    id           TEXT PRIMARY KEY,
    is_own       INTEGER NOT NULL,
    private_key  TEXT,
    public_key   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS foreign_address (
    id           TEXT PRIMARY KEY,
    contact_id   TEXT NOT NULL REFERENCES contact(id),
    key_id       TEXT NOT NULL REFERENCES nacl_key(id),
    is_used      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_foreign_address_contact ON foreign_address(contact_id, is_used);

CREATE TABLE IF NOT EXISTS own_address (
    id           TEXT PRIMARY KEY,
    given_to     TEXT REFERENCES contact(id),
    key_id       TEXT NOT NULL REFERENCES nacl_key(id),
    is_used      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_own_address_key ON own_address(key_id);

CREATE TABLE IF NOT EXISTS message (
    id                   TEXT PRIMARY KEY,
    meta_received_at     TEXT NOT NULL,
    meta_last_seen_at    TEXT NOT NULL,
    meta_forward_count   INTEGER NOT NULL DEFAULT 0,
    header_address       TEXT NOT NULL,
    header_sent_at       TEXT NOT NULL,
    body_contents        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_message_forward_count ON message(meta_forward_count);
CREATE INDEX IF NOT EXISTS idx_message_header_address ON message(header_address);
"#;

pub const SCHEMA_VERSION: u32 = 1;
