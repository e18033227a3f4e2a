//! Object metadata encryption
//!
//! Committing an upload sends the user metadata wrapped in three records:
//!
//! ```text
//! SerializableMeta { user_defined }      -- serialized into
//! StreamInfo { metadata }                -- encrypted with a fresh metadata key
//! StreamMeta { encrypted_stream_info }   -- the blob the service stores
//! ```
//!
//! The metadata key itself is encrypted under the object's derived content
//! key with a fresh random nonce and travels next to the blob.

use crate::encryption::{self, EncryptionParameters, Key, KeyStore, Nonce};
use crate::{CustomMetadata, Result, StrandError};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Canonical record of user metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableMeta {
    pub user_defined: CustomMetadata,
}

/// Stream-level information protected by the metadata key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub metadata: Vec<u8>,
}

/// Envelope transmitted to the metainfo service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub encrypted_stream_info: Vec<u8>,
}

/// Everything a commit needs to send; safe to transmit as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPayload {
    pub encrypted_metadata: Vec<u8>,
    pub encrypted_key: Vec<u8>,
    pub key_nonce: Nonce,
}

/// Build the encrypted metadata payload for committing `bucket`/`key`.
///
/// A new metadata key and nonce are drawn from `rng` on every call. Any
/// failure aborts the whole preparation and nothing is returned.
pub fn prepare_commit_payload<R: RngCore + CryptoRng>(
    store: &KeyStore,
    params: &EncryptionParameters,
    bucket: &str,
    key: &str,
    custom: &CustomMetadata,
    rng: &mut R,
) -> Result<CommitPayload> {
    let derived_key = store.derive_content_key(bucket, key)?;

    let metadata_key = Key::random(rng)?;
    let key_nonce = Nonce::random(rng)?;

    let metadata = serde_json::to_vec(&SerializableMeta {
        user_defined: custom.clone(),
    })?;
    let stream_info = serde_json::to_vec(&StreamInfo { metadata })?;

    let encrypted_key = encryption::encrypt_key(&metadata_key, params.cipher_suite, &derived_key, &key_nonce)?;

    // The metadata key is single use, so a zero nonce never repeats under it.
    let encrypted_stream_info = encryption::encrypt(&stream_info, params.cipher_suite, &metadata_key, &Nonce::default())?;

    let encrypted_metadata = serde_json::to_vec(&StreamMeta {
        encrypted_stream_info,
    })?;

    Ok(CommitPayload {
        encrypted_metadata,
        encrypted_key,
        key_nonce,
    })
}

/// Reverse [`prepare_commit_payload`] and recover the user metadata.
///
/// Objects committed without metadata carry an empty blob and yield empty
/// metadata.
pub fn open_metadata(
    store: &KeyStore,
    params: &EncryptionParameters,
    bucket: &str,
    key: &str,
    encrypted_metadata: &[u8],
    encrypted_key: &[u8],
    key_nonce: &Nonce,
) -> Result<CustomMetadata> {
    if encrypted_metadata.is_empty() {
        return Ok(CustomMetadata::default());
    }

    let derived_key = store.derive_content_key(bucket, key).map_err(|e| match e {
        StrandError::MissingEncryptionBase(b) => StrandError::MissingDecryptionBase(b),
        other => other,
    })?;

    let metadata_key = encryption::decrypt_key(encrypted_key, params.cipher_suite, &derived_key, key_nonce)?;

    let stream_meta: StreamMeta = serde_json::from_slice(encrypted_metadata)?;
    let stream_info = encryption::decrypt(
        &stream_meta.encrypted_stream_info,
        params.cipher_suite,
        &metadata_key,
        &Nonce::default(),
    )?;

    let stream_info: StreamInfo = serde_json::from_slice(&stream_info)?;
    let meta: SerializableMeta = serde_json::from_slice(&stream_info.metadata)?;
    Ok(meta.user_defined)
}
