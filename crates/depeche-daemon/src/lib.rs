//! depeche-daemon: wiring the protocol engine crates into a runnable node.
//!
//! `main.rs` is a thin [`clap`] front end over the modules here so that the
//! `depeche-daemon/tests/` integration suite can drive the same code paths
//! the `depeched` binary does.

pub mod commands;
pub mod config;
pub mod identity;
pub mod worker;

pub use config::DaemonConfig;
