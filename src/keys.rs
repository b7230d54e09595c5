//! Keypair generation for peer identities
//!
//! Uses X25519 key material encoded as base64, the format WireGuard
//! itself uses on the wire and in interface files.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// A generated keypair, both halves base64 encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    pub private: String,
    pub public: String,
}

/// Source of fresh keypairs for new peer records
///
/// The registry only ever asks for a new pair; it never regenerates keys
/// for an existing record.
pub trait KeypairGenerator: Send + Sync {
    /// Generate a fresh high-entropy keypair
    fn generate(&self) -> Keypair;
}

/// X25519 keypair generator backed by the OS RNG
#[derive(Debug, Default)]
pub struct X25519Generator;

impl KeypairGenerator for X25519Generator {
    fn generate(&self) -> Keypair {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Keypair {
            private: BASE64.encode(secret.to_bytes()),
            public: BASE64.encode(public.as_bytes()),
        }
    }
}

/// Decode a base64 key and check it is exactly 32 bytes
pub fn decode_key(b64: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(b64.trim())
        .map_err(|e| Error::InvalidKey(format!("not valid base64: {}", e)))?;
    if bytes.len() != 32 {
        return Err(Error::InvalidKey(format!(
            "wrong key length: {} (expected 32)",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Derive the base64 public key from a base64 private key
///
/// Used to cross-check that a stored record's PUBKEY really belongs to
/// its PRIVKEY.
pub fn derive_public(private_b64: &str) -> Result<String> {
    let secret = StaticSecret::from(decode_key(private_b64)?);
    let public = PublicKey::from(&secret);
    Ok(BASE64.encode(public.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_derives_matching_public() {
        let pair = X25519Generator.generate();
        assert_eq!(derive_public(&pair.private).unwrap(), pair.public);
    }

    #[test]
    fn test_generate_is_not_reused() {
        let a = X25519Generator.generate();
        let b = X25519Generator.generate();
        assert_ne!(a.private, b.private);
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_key("not base64 at all!!!").is_err());
        // valid base64 but wrong length
        assert!(decode_key("aGVsbG8=").is_err());
    }
}
