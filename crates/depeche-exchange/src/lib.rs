//! # depeche-exchange
//!
//! The bidirectional message-exchange loop (Section 4.6): alternating
//! send/receive phases over one TCP connection, with `stop_sending` /
//! `no_more_data` flow control and idempotent, order-preserving delivery
//! to a caller-supplied callback.

mod engine;

pub use engine::{run_exchange, MessageSource, UserMessagePayload};
