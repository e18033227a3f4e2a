//! Project configuration
//!
//! Loaded from JSON. Example:
//!
//! ```json
//! {
//!   "encryption": { "cipher_suite": "xchacha20poly1305", "path_cipher": "aes_gcm" },
//!   "keys": { "passphrase": "secret", "salt": "project-1", "buckets": { "logs": "<hex>" } }
//! }
//! ```

use crate::encryption::{CipherSuite, EncryptionParameters, Key, KeyStore};
use crate::{Result, StrandError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub encryption: EncryptionConfig,
    pub keys: KeysConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub cipher_suite: CipherSuite,
    /// Defaults to `cipher_suite` when absent
    pub path_cipher: Option<CipherSuite>,
    pub block_size: i32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        let params = EncryptionParameters::default();
        EncryptionConfig {
            cipher_suite: params.cipher_suite,
            path_cipher: None,
            block_size: params.block_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub passphrase: Option<String>,
    pub salt: String,
    /// Hex encoded 32-byte root key; wins over `passphrase`
    pub root_key: Option<String>,
    /// Per-bucket hex encoded root keys
    pub buckets: BTreeMap<String, String>,
}

impl ProjectConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ProjectConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.encryption.block_size <= 0 {
            return Err(StrandError::Internal(format!(
                "invalid block size: {}",
                self.encryption.block_size
            )));
        }
        Ok(())
    }

    pub fn encryption_parameters(&self) -> EncryptionParameters {
        EncryptionParameters {
            cipher_suite: self.encryption.cipher_suite,
            block_size: self.encryption.block_size,
        }
    }

    /// Build the key store described by `keys`
    pub fn key_store(&self) -> Result<KeyStore> {
        let mut store = KeyStore::new();
        store.set_path_cipher(self.encryption.path_cipher.unwrap_or(self.encryption.cipher_suite));

        if let Some(root) = &self.keys.root_key {
            store.set_default_key(Key::from_hex(root)?);
        } else if let Some(passphrase) = &self.keys.passphrase {
            store.set_default_key(Key::from_passphrase(passphrase, self.keys.salt.as_bytes()));
        }

        for (bucket, encoded) in &self.keys.buckets {
            store.add_bucket_key(bucket.clone(), Key::from_hex(encoded)?);
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::from_json_str("{}").unwrap();
        assert_eq!(config.encryption_parameters(), EncryptionParameters::default());

        // No key configured: derivation must fail, not silently succeed.
        let store = config.key_store().unwrap();
        assert!(store.derive_content_key("bucket", "key").is_err());
    }

    #[test]
    fn test_passphrase_and_bucket_override() {
        let json = format!(
            r#"{{
                "encryption": {{ "cipher_suite": "aes_gcm", "path_cipher": "null" }},
                "keys": {{ "passphrase": "pw", "salt": "s", "buckets": {{ "logs": "{}" }} }}
            }}"#,
            "11".repeat(32)
        );
        let config = ProjectConfig::from_json_str(&json).unwrap();
        assert_eq!(config.encryption.cipher_suite, CipherSuite::AesGcm);

        let store = config.key_store().unwrap();
        assert_eq!(store.path_cipher(), CipherSuite::Null);
        assert_ne!(
            store.derive_content_key("logs", "a").unwrap(),
            store.derive_content_key("other", "a").unwrap()
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ProjectConfig::from_json_str(r#"{"encryption":{"block_size":0}}"#).is_err());
        assert!(ProjectConfig::from_json_str(r#"{"encryption":{"cipher_suite":"rot13"}}"#).is_err());

        let config = ProjectConfig::from_json_str(r#"{"keys":{"root_key":"zz"}}"#).unwrap();
        assert!(config.key_store().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"keys":{{"root_key":"{}"}}}}"#, "ab".repeat(32)).unwrap();

        let config = ProjectConfig::load(file.path()).unwrap();
        let store = config.key_store().unwrap();
        assert!(store.derive_content_key("bucket", "key").is_ok());
    }
}
