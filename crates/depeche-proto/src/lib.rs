//! # depeche-proto
//!
//! The framed TCP segment protocol (Section 3, Section 4.1): a
//! self-delimiting frame on top of any reliable byte stream, used to carry
//! both the rendezvous handshake payload and exchange-loop messages.
//!
//! [`segment`] exposes free functions rather than a trait object, mirroring
//! the way the codec it's modeled on reads as a pair of plain functions over
//! a socket rather than a stateful framing type.

pub mod segment;

pub use segment::{read, send};
