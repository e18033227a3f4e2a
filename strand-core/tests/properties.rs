//! Property-based tests for strand core

use proptest::prelude::*;
use strand_core::encryption::{CipherSuite, Key, KeyStore};
use strand_core::upload_id;

proptest! {
    #[test]
    fn props_upload_id_round_trips(
        raw in prop::collection::vec(any::<u8>(), 1..128)
    ) {
        let encoded = upload_id::encode(&raw);
        prop_assert_eq!(upload_id::decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn props_arbitrary_strings_are_rejected(s in "[1-9A-HJ-NP-Za-km-z]{0,40}") {
        // A random base58 string passes the 32-bit checksum with negligible
        // probability; anything that does decode must re-encode identically.
        if let Ok(raw) = upload_id::decode(&s) {
            prop_assert_eq!(upload_id::encode(&raw), s);
        }
    }

    #[test]
    fn props_single_character_edits_are_detected(
        raw in prop::collection::vec(any::<u8>(), 1..64),
        position in any::<prop::sample::Index>(),
        replacement in prop::sample::select(b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz".to_vec()),
    ) {
        let encoded = upload_id::encode(&raw);
        let index = position.index(encoded.len());
        let mut bytes = encoded.clone().into_bytes();
        prop_assume!(bytes[index] != replacement);
        bytes[index] = replacement;
        let tampered = String::from_utf8(bytes).unwrap();

        prop_assert!(upload_id::decode(&tampered).is_err());
    }

    #[test]
    fn props_path_encryption_round_trips(
        components in prop::collection::vec("[a-zA-Z0-9._-]{1,12}", 1..6),
        suite in prop::sample::select(vec![CipherSuite::AesGcm, CipherSuite::XChaCha20Poly1305, CipherSuite::Null]),
    ) {
        let mut store = KeyStore::with_default_key(Key::from_bytes([21; 32]));
        store.set_path_cipher(suite);

        let path = components.join("/");
        let encrypted = store.encrypt_path("bucket", &path).unwrap();
        prop_assert_eq!(store.decrypt_path("bucket", &encrypted).unwrap(), path);
    }
}

#[cfg(test)]
mod codec_tests {
    use super::*;

    #[test]
    fn test_decoded_handle_matches_original_bytes() {
        let raw: Vec<u8> = (0u8..=255).collect();
        let encoded = upload_id::encode(&raw);
        assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(upload_id::decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_empty_identifier_is_invalid() {
        assert_eq!(upload_id::decode(""), Err(upload_id::InvalidUploadId));
    }
}
