//! # depeche-discovery
//!
//! UDP broadcast service announcements (Section 4.4): the mechanism by
//! which a node advertises a rendezvous or exchange server without prior
//! knowledge of who is listening.

pub mod announcement;

pub use announcement::{listen_announcements, send_announcement, Announcement, ServerType};
