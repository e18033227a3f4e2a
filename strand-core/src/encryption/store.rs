//! Root key store and hierarchical key derivation
//!
//! Keys are derived per bucket and per path component with HKDF-SHA256, so
//! the same `(bucket, key)` pair always yields the same content key under the
//! same root. Path components are encrypted deterministically so the remote
//! service can list and look up objects without learning their names.

use super::cipher::{self, CipherSuite};
use super::{Key, Nonce, NONCE_SIZE};
use crate::{Result, StrandError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;
use std::collections::HashMap;

const PATH_SEPARATOR: char = '/';

/// Holds the root keys a project can derive from
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    default_key: Option<Key>,
    bucket_keys: HashMap<String, Key>,
    path_cipher: CipherSuite,
}

impl KeyStore {
    /// Empty store; every derivation fails until a key is added
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a default root key for every bucket
    pub fn with_default_key(key: Key) -> Self {
        KeyStore {
            default_key: Some(key),
            ..Default::default()
        }
    }

    pub fn set_default_key(&mut self, key: Key) {
        self.default_key = Some(key);
    }

    /// Override the root key for a single bucket
    pub fn add_bucket_key(&mut self, bucket: impl Into<String>, key: Key) {
        self.bucket_keys.insert(bucket.into(), key);
    }

    pub fn set_path_cipher(&mut self, suite: CipherSuite) {
        self.path_cipher = suite;
    }

    pub fn path_cipher(&self) -> CipherSuite {
        self.path_cipher
    }

    fn root(&self, bucket: &str) -> Option<&Key> {
        self.bucket_keys.get(bucket).or(self.default_key.as_ref())
    }

    fn bucket_key(&self, bucket: &str, missing: fn(String) -> StrandError) -> Result<Key> {
        let root = self.root(bucket).ok_or_else(|| missing(bucket.to_string()))?;
        derive(root, format!("bucket:{}", bucket).as_bytes())
    }

    /// Deterministically derive the content key of an object
    pub fn derive_content_key(&self, bucket: &str, key: &str) -> Result<Key> {
        let mut current = self.bucket_key(bucket, StrandError::MissingEncryptionBase)?;
        for component in components(key) {
            current = derive(&current, format!("path:{}", component).as_bytes())?;
        }
        derive(&current, b"content")
    }

    /// Encrypt an object key (or a `/`-terminated prefix) for transmission
    pub fn encrypt_path(&self, bucket: &str, path: &str) -> Result<String> {
        let mut current = self.bucket_key(bucket, StrandError::MissingEncryptionBase)?;
        let (body, trailing) = split_trailing(path);
        if body.is_empty() {
            return Ok(path.to_string());
        }

        let mut encrypted = Vec::new();
        for component in body.split(PATH_SEPARATOR) {
            encrypted.push(self.encrypt_component(&current, component)?);
            current = derive(&current, format!("path:{}", component).as_bytes())?;
        }

        Ok(join(encrypted, trailing))
    }

    /// Decrypt a full encrypted object key
    pub fn decrypt_path(&self, bucket: &str, encrypted: &str) -> Result<String> {
        self.decrypt_path_under(bucket, "", encrypted)
    }

    /// Decrypt `encrypted`, which is relative to the already known plain
    /// `prefix` (empty or `/`-terminated). Returns the relative plain path.
    pub fn decrypt_path_under(&self, bucket: &str, prefix: &str, encrypted: &str) -> Result<String> {
        let mut current = self.bucket_key(bucket, StrandError::MissingDecryptionBase)?;
        let (prefix_body, _) = split_trailing(prefix);
        if !prefix_body.is_empty() {
            for component in prefix_body.split(PATH_SEPARATOR) {
                current = derive(&current, format!("path:{}", component).as_bytes())?;
            }
        }

        let (body, trailing) = split_trailing(encrypted);
        if body.is_empty() {
            return Ok(encrypted.to_string());
        }

        let mut plain = Vec::new();
        for component in body.split(PATH_SEPARATOR) {
            let decrypted = self.decrypt_component(&current, component)?;
            current = derive(&current, format!("path:{}", decrypted).as_bytes())?;
            plain.push(decrypted);
        }

        Ok(join(plain, trailing))
    }

    fn encrypt_component(&self, parent: &Key, component: &str) -> Result<String> {
        if self.path_cipher == CipherSuite::Null {
            return Ok(component.to_string());
        }

        let key = derive(parent, b"encryption")?;
        let nonce = synthetic_nonce(&key, component)?;
        let sealed = cipher::encrypt(component.as_bytes(), self.path_cipher, &key, &nonce)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    fn decrypt_component(&self, parent: &Key, component: &str) -> Result<String> {
        if self.path_cipher == CipherSuite::Null {
            return Ok(component.to_string());
        }

        let raw = URL_SAFE_NO_PAD
            .decode(component)
            .map_err(|e| StrandError::Encryption(format!("invalid path component: {}", e)))?;
        if raw.len() < NONCE_SIZE {
            return Err(StrandError::Encryption("path component too short".to_string()));
        }

        let (nonce, sealed) = raw.split_at(NONCE_SIZE);
        let key = derive(parent, b"encryption")?;
        let plain = cipher::decrypt(sealed, self.path_cipher, &key, &Nonce::try_from_slice(nonce)?)?;
        String::from_utf8(plain)
            .map_err(|_| StrandError::Encryption("path component is not utf-8".to_string()))
    }
}

fn derive(parent: &Key, info: &[u8]) -> Result<Key> {
    let hk = Hkdf::<Sha256>::new(None, parent.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| StrandError::Encryption(format!("key derivation failed: {}", e)))?;
    Ok(Key::from_bytes(okm))
}

fn synthetic_nonce(key: &Key, component: &str) -> Result<Nonce> {
    let hash = blake3::keyed_hash(key.as_bytes(), component.as_bytes());
    Nonce::try_from_slice(&hash.as_bytes()[..NONCE_SIZE])
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR)
}

fn split_trailing(path: &str) -> (&str, bool) {
    match path.strip_suffix(PATH_SEPARATOR) {
        Some(body) => (body, true),
        None => (path, false),
    }
}

fn join(parts: Vec<String>, trailing: bool) -> String {
    let mut joined = parts.join("/");
    if trailing {
        joined.push(PATH_SEPARATOR);
    }
    joined
}
