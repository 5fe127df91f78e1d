//! Anonymous sealed-box encryption (Section 4.2): encrypt to a recipient's
//! public key without revealing (or even requiring) a sender identity.
//!
//! Construction: an ephemeral X25519 keypair is generated per call, an ECDH
//! shared secret is computed against the recipient's static public key, and
//! `BLAKE2b-256(ephemeral_pk || recipient_pk || shared_secret)` derives the
//! ChaCha20-Poly1305 key. Wire form =
//! `Base64(ephemeral_pk || nonce || ciphertext || tag)`; the ephemeral
//! public key and nonce travel alongside the ciphertext since the recipient
//! has no other way to recover them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::{digest::consts::U32, Blake2b, Digest};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::keys::{public_from_hex, secret_from_hex};
use crate::crypto_err;
use depeche_types::DepecheError;

type Blake2b256 = Blake2b<U32>;

const PUBKEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

fn derive_key(ephemeral_pk: &PublicKey, recipient_pk: &PublicKey, shared_secret: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(ephemeral_pk.as_bytes());
    hasher.update(recipient_pk.as_bytes());
    hasher.update(shared_secret);
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// Seal `plaintext` so only the holder of `peer_public_key_hex`'s private
/// key can open it.
pub fn encrypt(plaintext: &[u8], peer_public_key_hex: &str) -> Result<String, DepecheError> {
    let recipient_pk = public_from_hex(peer_public_key_hex)?;

    let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient_pk);

    let key = derive_key(&ephemeral_pk, &recipient_pk, shared_secret.as_bytes());
    let cipher = ChaCha20Poly1305::new((&key).into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("chacha20poly1305 encryption does not fail for valid inputs");

    let mut wire = Vec::with_capacity(PUBKEY_SIZE + NONCE_SIZE + ciphertext.len());
    wire.extend_from_slice(ephemeral_pk.as_bytes());
    wire.extend_from_slice(&nonce_bytes);
    wire.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(wire))
}

/// Open a sealed box addressed to `own_private_key_hex`.
pub fn decrypt(ciphertext_b64: &str, own_private_key_hex: &str) -> Result<Vec<u8>, DepecheError> {
    let wire = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| crypto_err(format!("malformed ciphertext: {e}")))?;
    if wire.len() < PUBKEY_SIZE + NONCE_SIZE {
        return Err(crypto_err("ciphertext shorter than header"));
    }
    let (ephemeral_pk_bytes, rest) = wire.split_at(PUBKEY_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let ephemeral_pk_arr: [u8; 32] = ephemeral_pk_bytes
        .try_into()
        .map_err(|_| crypto_err("malformed ephemeral public key"))?;
    let ephemeral_pk = PublicKey::from(ephemeral_pk_arr);

    let own_secret = secret_from_hex(own_private_key_hex)?;
    let own_pk = PublicKey::from(&own_secret);
    let shared_secret = own_secret.diffie_hellman(&ephemeral_pk);

    let key = derive_key(&ephemeral_pk, &own_pk, shared_secret.as_bytes());
    let cipher = ChaCha20Poly1305::new((&key).into());
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| crypto_err("decryption failed: wrong key or tampered ciphertext"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn round_trips() {
        let (sk, pk) = generate_keypair();
        let wire = encrypt(b"sealed contents", &pk).unwrap();
        let back = decrypt(&wire, &sk).unwrap();
        assert_eq!(back, b"sealed contents");
    }

    #[test]
    fn wrong_recipient_key_fails() {
        let (_, pk) = generate_keypair();
        let (other_sk, _) = generate_keypair();
        let wire = encrypt(b"sealed contents", &pk).unwrap();
        assert!(decrypt(&wire, &other_sk).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let (sk, pk) = generate_keypair();
        let wire = encrypt(b"sealed contents", &pk).unwrap();
        let mut raw = STANDARD.decode(wire).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = STANDARD.encode(raw);
        assert!(decrypt(&tampered, &sk).is_err());
    }

    #[test]
    fn two_seals_of_same_plaintext_differ() {
        let (_, pk) = generate_keypair();
        let a = encrypt(b"same plaintext", &pk).unwrap();
        let b = encrypt(b"same plaintext", &pk).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_recipient_key() {
        assert!(encrypt(b"x", "not hex").is_err());
    }
}
