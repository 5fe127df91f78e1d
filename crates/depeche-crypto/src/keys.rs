//! X25519 static keypair generation and hex (de)serialization.
//!
//! Every key that leaves this module is hex text — [`KeyRecord`](depeche_types::KeyRecord)
//! and the rest of the workspace never see raw key bytes.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto_err;
use depeche_types::DepecheError;

/// Generate a fresh X25519 static keypair, returned as `(private_hex, public_hex)`.
pub fn generate_keypair() -> (String, String) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (hex::encode(secret.to_bytes()), hex::encode(public.as_bytes()))
}

pub(crate) fn secret_from_hex(hex_str: &str) -> Result<StaticSecret, DepecheError> {
    let bytes = hex::decode(hex_str).map_err(|e| crypto_err(format!("malformed private key: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| crypto_err("private key must be 32 bytes"))?;
    Ok(StaticSecret::from(arr))
}

pub(crate) fn public_from_hex(hex_str: &str) -> Result<PublicKey, DepecheError> {
    let bytes = hex::decode(hex_str).map_err(|e| crypto_err(format!("malformed public key: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| crypto_err("public key must be 32 bytes"))?;
    Ok(PublicKey::from(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_round_trip_through_hex() {
        let (sk_hex, pk_hex) = generate_keypair();
        let sk = secret_from_hex(&sk_hex).unwrap();
        let pk = public_from_hex(&pk_hex).unwrap();
        assert_eq!(PublicKey::from(&sk).as_bytes(), pk.as_bytes());
    }

    #[test]
    fn rejects_short_key() {
        assert!(secret_from_hex("deadbeef").is_err());
    }
}
