//! `depeched` subcommand implementations.

pub mod pad;
pub mod send;
pub mod start;
