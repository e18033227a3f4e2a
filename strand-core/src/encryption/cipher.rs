//! Authenticated encryption over the supported cipher suites

use super::{Key, Nonce};
use crate::{Result, StrandError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};

const AES_GCM_NONCE_SIZE: usize = 12;

/// Cipher suite used for object metadata and paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    /// No encryption; data passes through unchanged
    #[serde(rename = "null")]
    Null,
    /// AES-256-GCM using the first 12 bytes of the nonce
    #[serde(rename = "aes_gcm")]
    AesGcm,
    /// XChaCha20-Poly1305 using the full 24-byte nonce
    #[default]
    #[serde(rename = "xchacha20poly1305")]
    XChaCha20Poly1305,
}

/// Project-wide encryption settings sent along with new objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParameters {
    pub cipher_suite: CipherSuite,
    pub block_size: i32,
}

impl Default for EncryptionParameters {
    fn default() -> Self {
        EncryptionParameters {
            cipher_suite: CipherSuite::default(),
            block_size: 29 * 256,
        }
    }
}

/// Encrypt `data` with `key` and `nonce`
pub fn encrypt(data: &[u8], suite: CipherSuite, key: &Key, nonce: &Nonce) -> Result<Vec<u8>> {
    match suite {
        CipherSuite::Null => Ok(data.to_vec()),
        CipherSuite::AesGcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| StrandError::Encryption(format!("failed to create cipher: {}", e)))?;
            let nonce = aes_gcm::Nonce::from_slice(&nonce.as_bytes()[..AES_GCM_NONCE_SIZE]);
            cipher
                .encrypt(nonce, data)
                .map_err(|e| StrandError::Encryption(format!("encryption failed: {}", e)))
        }
        CipherSuite::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| StrandError::Encryption(format!("failed to create cipher: {}", e)))?;
            cipher
                .encrypt(XNonce::from_slice(nonce.as_bytes()), data)
                .map_err(|e| StrandError::Encryption(format!("encryption failed: {}", e)))
        }
    }
}

/// Decrypt `data` with `key` and `nonce`
pub fn decrypt(data: &[u8], suite: CipherSuite, key: &Key, nonce: &Nonce) -> Result<Vec<u8>> {
    match suite {
        CipherSuite::Null => Ok(data.to_vec()),
        CipherSuite::AesGcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| StrandError::Encryption(format!("failed to create cipher: {}", e)))?;
            let nonce = aes_gcm::Nonce::from_slice(&nonce.as_bytes()[..AES_GCM_NONCE_SIZE]);
            cipher
                .decrypt(nonce, data)
                .map_err(|e| StrandError::Encryption(format!("decryption failed: {}", e)))
        }
        CipherSuite::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| StrandError::Encryption(format!("failed to create cipher: {}", e)))?;
            cipher
                .decrypt(XNonce::from_slice(nonce.as_bytes()), data)
                .map_err(|e| StrandError::Encryption(format!("decryption failed: {}", e)))
        }
    }
}

/// Encrypt a key with a deriving key
pub fn encrypt_key(to_encrypt: &Key, suite: CipherSuite, deriving_key: &Key, nonce: &Nonce) -> Result<Vec<u8>> {
    encrypt(to_encrypt.as_bytes(), suite, deriving_key, nonce)
}

/// Decrypt a key previously produced by [`encrypt_key`]
pub fn decrypt_key(encrypted: &[u8], suite: CipherSuite, deriving_key: &Key, nonce: &Nonce) -> Result<Key> {
    let plain = decrypt(encrypted, suite, deriving_key, nonce)?;
    Key::try_from_slice(&plain)
}
