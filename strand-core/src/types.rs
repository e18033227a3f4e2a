//! Core data types for strand

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Raw binary stream identifier issued by the metainfo service.
///
/// Callers never see this directly; it travels as an upload ID (see
/// [`crate::upload_id`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(Vec<u8>);

impl StreamId {
    /// Create a stream ID from raw bytes, rejecting empty input
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.is_empty() {
            return Err(crate::StrandError::InvalidStreamId("empty stream id".to_string()));
        }
        Ok(StreamId(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form, used for storage keys and logs
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// User-defined key/value metadata attached to an object.
///
/// Backed by a `BTreeMap` so serialization is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomMetadata(BTreeMap<String, String>);

impl CustomMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CustomMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        CustomMetadata(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Metadata maintained by the system rather than the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemMetadata {
    pub created: Option<SystemTime>,
    pub expires: Option<SystemTime>,
    pub content_length: i64,
}

/// Object descriptor returned to callers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    pub key: String,
    pub is_prefix: bool,
    pub system: SystemMetadata,
    pub custom: CustomMetadata,
}

impl Object {
    /// Descriptor carrying only the key
    pub fn with_key(key: impl Into<String>) -> Self {
        Object {
            key: key.into(),
            ..Default::default()
        }
    }
}

/// Information about a pending multipart upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadInfo {
    pub upload_id: String,
    pub key: String,
    pub is_prefix: bool,
    pub system: SystemMetadata,
    pub custom: CustomMetadata,
}

/// Snapshot of one part of a multipart upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub part_number: u32,
    /// Plain (unencrypted) size of the part
    pub size: i64,
    pub modified: Option<SystemTime>,
    pub etag: Vec<u8>,
}

impl Part {
    pub fn new(part_number: u32) -> Self {
        Part {
            part_number,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_rejects_empty_bytes() {
        assert!(StreamId::from_bytes(&[]).is_err());

        let id = StreamId::from_bytes(&[0xde, 0xad]).unwrap();
        assert_eq!(id.as_bytes(), &[0xde, 0xad]);
        assert_eq!(id.to_hex(), "dead");
    }

    #[test]
    fn test_custom_metadata_serializes_in_key_order() {
        let metadata: CustomMetadata = [("zeta", "1"), ("alpha", "2")].into_iter().collect();
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"alpha":"2","zeta":"1"}"#);
        assert_eq!(metadata.get("alpha"), Some("2"));
        assert_eq!(metadata.len(), 2);
    }
}
