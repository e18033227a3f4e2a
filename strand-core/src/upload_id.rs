//! Upload identifier codec
//!
//! An upload ID is `base58(version || stream_id || checksum)` where the
//! checksum is the first four bytes of `sha256(sha256(version || stream_id))`.
//! The string is derived purely from the stream ID, so it stays valid across
//! process restarts.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// The only supported version byte
pub const VERSION: u8 = 1;

const CHECKSUM_LEN: usize = 4;

/// Any decoding failure: bad alphabet, bad checksum or wrong version
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("upload ID invalid")]
pub struct InvalidUploadId;

/// Encode a raw stream handle as an upload ID
pub fn encode(raw: &[u8]) -> String {
    encode_versioned(raw, VERSION)
}

/// Decode an upload ID back to the raw stream handle
pub fn decode(upload_id: &str) -> Result<Vec<u8>, InvalidUploadId> {
    let buf = bs58::decode(upload_id)
        .into_vec()
        .map_err(|_| InvalidUploadId)?;

    if buf.len() < 1 + CHECKSUM_LEN {
        return Err(InvalidUploadId);
    }

    let (body, checksum) = buf.split_at(buf.len() - CHECKSUM_LEN);
    if !bool::from(checksum.ct_eq(&checksum_of(body))) {
        return Err(InvalidUploadId);
    }

    if body[0] != VERSION {
        return Err(InvalidUploadId);
    }

    Ok(body[1..].to_vec())
}

fn encode_versioned(raw: &[u8], version: u8) -> String {
    let mut buf = Vec::with_capacity(1 + raw.len() + CHECKSUM_LEN);
    buf.push(version);
    buf.extend_from_slice(raw);
    let checksum = checksum_of(&buf);
    buf.extend_from_slice(&checksum);
    bs58::encode(buf).into_string()
}

fn checksum_of(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let first = Sha256::digest(body);
    let second = Sha256::digest(first);
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&second[..CHECKSUM_LEN]);
    checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let raw = b"\x01\x02stream-handle\xff";
        let encoded = encode(raw);
        assert_eq!(decode(&encoded).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_encoding_is_stable() {
        // Same handle must always produce the same string.
        let raw = [7u8; 32];
        assert_eq!(encode(&raw), encode(&raw));
    }

    #[test]
    fn test_rejects_other_versions_with_valid_checksum() {
        let raw = [42u8; 16];
        for version in [0u8, 2, 255] {
            let encoded = encode_versioned(&raw, version);
            assert_eq!(decode(&encoded), Err(InvalidUploadId));
        }
    }

    #[test]
    fn test_rejects_corrupted_checksum() {
        let raw = [9u8; 16];
        let mut buf = bs58::decode(encode(&raw)).into_vec().unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0x01;
        let tampered = bs58::encode(buf).into_string();
        assert_eq!(decode(&tampered), Err(InvalidUploadId));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(decode(""), Err(InvalidUploadId));
        assert_eq!(decode("0OIl"), Err(InvalidUploadId));
        assert_eq!(decode("abc"), Err(InvalidUploadId));
    }
}
