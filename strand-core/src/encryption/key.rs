//! Symmetric key material
//!
//! Provides the fixed-size key and nonce types shared by the cipher
//! functions, the key store and the metadata pipeline.

use crate::{Result, StrandError};
use rand::{CryptoRng, RngCore};
use std::fmt;

/// Size of a symmetric key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes
pub const NONCE_SIZE: usize = 24;

const PASSPHRASE_CONTEXT: &str = "strand 2024-01-01 root key from passphrase";

/// 256-bit symmetric key
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Create key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Key(bytes)
    }

    /// Create key from a slice that must be exactly `KEY_SIZE` long
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            StrandError::Encryption(format!(
                "invalid key length: expected {}, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Key(array))
    }

    /// Parse a hex encoded key
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| StrandError::Encryption(format!("invalid hex key: {}", e)))?;
        Self::try_from_slice(&bytes)
    }

    /// Derive a root key from a passphrase and salt
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Self {
        let mut material = Vec::with_capacity(passphrase.len() + salt.len());
        material.extend_from_slice(salt);
        material.extend_from_slice(passphrase.as_bytes());
        Key(blake3::derive_key(PASSPHRASE_CONTEXT, &material))
    }

    /// Fill a new key from a cryptographically secure source
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| StrandError::Random(e.to_string()))?;
        Ok(Key(bytes))
    }

    /// Get key bytes (sensitive operation)
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short non-secret identifier, safe for logs
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        hex::encode(&hash.as_bytes()[..8])
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// 192-bit nonce; ciphers with shorter nonces use a prefix of it
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Nonce(bytes)
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| {
            StrandError::Encryption(format!(
                "invalid nonce length: expected {}, got {}",
                NONCE_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Nonce(array))
    }

    /// Fill a new nonce from a cryptographically secure source
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| StrandError::Random(e.to_string()))?;
        Ok(Nonce(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_random_keys_differ() {
        let a = Key::random(&mut OsRng).unwrap();
        let b = Key::random(&mut OsRng).unwrap();
        assert_ne!(a, b);

        let n1 = Nonce::random(&mut OsRng).unwrap();
        let n2 = Nonce::random(&mut OsRng).unwrap();
        assert_ne!(n1, n2);
        assert!(Nonce::default().is_zero());
    }

    #[test]
    fn test_passphrase_derivation_is_deterministic() {
        let a = Key::from_passphrase("correct horse", b"salt");
        let b = Key::from_passphrase("correct horse", b"salt");
        let c = Key::from_passphrase("correct horse", b"pepper");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hex_parsing() {
        let key = Key::from_hex(&"ab".repeat(KEY_SIZE)).unwrap();
        assert_eq!(key.as_bytes(), &[0xab; KEY_SIZE]);

        assert!(Key::from_hex("abcd").is_err());
        assert!(Key::from_hex("not hex").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = Key::from_bytes([0x11; KEY_SIZE]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(&hex::encode([0x11; KEY_SIZE])));
        assert!(rendered.contains(&key.fingerprint()));
    }
}
