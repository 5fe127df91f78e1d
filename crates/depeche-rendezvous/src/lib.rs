//! # depeche-rendezvous
//!
//! The two-sided rendezvous handshake (Section 4.5): a node runs both a
//! server role (accept an incoming dialer) and a chaser role (dial a heard
//! announcement) concurrently, and completes as soon as either produces the
//! peer's [`RendezvousInfo`].

mod handshake;
mod session;

pub use session::{rendezvous, RendezvousConfig};
