//! Passphrase-keyed symmetric encryption, used to protect the rendezvous
//! handshake under a pre-shared secret (Section 4.2, Section 5).
//!
//! Key = `BLAKE2b-256(passphrase bytes)`. AEAD = ChaCha20-Poly1305 with a
//! random 12-byte nonce. Wire form = `Base64(nonce || ciphertext || tag)` —
//! the nonce travels with the ciphertext since the passphrase is reused
//! across many messages and a fresh nonce is drawn every call.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::{digest::consts::U32, Blake2b, Digest};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use crate::crypto_err;
use depeche_types::DepecheError;

type Blake2b256 = Blake2b<U32>;

const NONCE_SIZE: usize = 12;

fn derive_key(passphrase: &str) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(passphrase.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// Encrypt `plaintext` under `passphrase`, returning Base64 ciphertext.
pub fn encrypt_symmetric(plaintext: &[u8], passphrase: &str) -> String {
    let key = derive_key(passphrase);
    let cipher = ChaCha20Poly1305::new((&key).into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("chacha20poly1305 encryption does not fail for valid inputs");

    let mut wire = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    wire.extend_from_slice(&nonce_bytes);
    wire.extend_from_slice(&ciphertext);
    STANDARD.encode(wire)
}

/// Decrypt Base64 ciphertext produced by [`encrypt_symmetric`] under the
/// same `passphrase`.
pub fn decrypt_symmetric(ciphertext_b64: &str, passphrase: &str) -> Result<Vec<u8>, DepecheError> {
    let wire = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| crypto_err(format!("malformed ciphertext: {e}")))?;
    if wire.len() < NONCE_SIZE {
        return Err(crypto_err("ciphertext shorter than nonce"));
    }
    let (nonce_bytes, ciphertext) = wire.split_at(NONCE_SIZE);
    let key = derive_key(passphrase);
    let cipher = ChaCha20Poly1305::new((&key).into());
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| crypto_err("decryption failed: wrong passphrase or tampered ciphertext"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let wire = encrypt_symmetric(b"hello depeche", "correct horse battery staple");
        let back = decrypt_symmetric(&wire, "correct horse battery staple").unwrap();
        assert_eq!(back, b"hello depeche");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let wire = encrypt_symmetric(b"hello depeche", "correct horse battery staple");
        assert!(decrypt_symmetric(&wire, "wrong passphrase").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let wire = encrypt_symmetric(b"hello depeche", "passphrase");
        let mut raw = STANDARD.decode(wire).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = STANDARD.encode(raw);
        assert!(decrypt_symmetric(&tampered, "passphrase").is_err());
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let wire = encrypt_symmetric(b"", "passphrase");
        let back = decrypt_symmetric(&wire, "passphrase").unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn two_encryptions_use_distinct_nonces() {
        let a = encrypt_symmetric(b"same plaintext", "passphrase");
        let b = encrypt_symmetric(b"same plaintext", "passphrase");
        assert_ne!(a, b);
    }
}
