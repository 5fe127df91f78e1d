//! # depeche-types
//!
//! Core data model shared across the depeche node-to-node protocol engine.
//!
//! - [`address`] — opaque single-use addresses and key records (Section 3 of
//!   the protocol).
//! - [`message`] — the wire message tagged union (`DepecheMessage`) and its
//!   container.
//! - [`rendezvous`] — `RendezvousInfo`, exchanged during the authenticated
//!   handshake.
//! - [`store_model`] — types read back from the address & key store
//!   (`StoredMessage`, `Contact`).
//! - [`error`] — the shared error type, [`DepecheError`].

pub mod address;
pub mod error;
pub mod message;
pub mod rendezvous;
pub mod store_model;

pub use address::{Address, KeyId, KeyRecord};
pub use error::DepecheError;
pub use message::{DepecheMessage, MessageContainer};
pub use rendezvous::RendezvousInfo;
pub use store_model::{Contact, StoredMessage};

pub type Result<T> = std::result::Result<T, DepecheError>;
