//! # depeche-crypto
//!
//! Cryptographic primitives for the depeche protocol (Section 4.2).
//!
//! This is the only crate in the workspace that deals in raw key material —
//! every other component handles keys and ciphertexts as opaque hex/Base64
//! text. No algorithm negotiation is offered; the suite is fixed:
//!
//! - [`symmetric`] — passphrase-derived ChaCha20-Poly1305, used for the
//!   rendezvous handshake under the pre-shared secret.
//! - [`sealed`] — anonymous X25519 + ChaCha20-Poly1305 sealed-box
//!   encryption, used to address user-message contents to a single public
//!   key without identifying the sender.
//! - [`keys`] — keypair generation and hex (de)serialization.

pub mod keys;
pub mod sealed;
pub mod symmetric;

pub use keys::generate_keypair;
pub use sealed::{decrypt as sealed_decrypt, encrypt as sealed_encrypt};
pub use symmetric::{decrypt_symmetric, encrypt_symmetric};

use depeche_types::DepecheError;

fn crypto_err(msg: impl Into<String>) -> DepecheError {
    DepecheError::Crypto(msg.into())
}
