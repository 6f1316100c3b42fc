//! Content addressing for stored values.

use sha1_smol::Sha1;

use crate::common::Key;

/// Hashes data to the key it is stored under.
pub fn hash_data(data: &[u8]) -> Key {
    let mut hasher = Sha1::new();
    hasher.update(data);

    Key(hasher.digest().bytes())
}

/// Encodes data to the string form of its key, as used by [Store](crate::Store)
/// backends.
pub fn encode_data(data: &[u8]) -> String {
    hash_data(data).to_string()
}

/// Checks that `data` actually hashes to `target`.
pub fn verify_content(data: &[u8], target: &Key) -> bool {
    hash_data(data) == *target
}

#[cfg(test)]
mod test {
    use super::*;

    const HELLO_HASH: [u8; 20] = [
        0xaa, 0xf4, 0xc6, 0x1d, 0xdc, 0xc5, 0xe8, 0xa2, 0xda, 0xbe, 0xde, 0x0f, 0x3b, 0x48, 0x2c,
        0xd9, 0xae, 0xa9, 0x43, 0x4d,
    ];

    #[test]
    fn hash_data_is_sha1() {
        assert_eq!(hash_data(b"hello"), Key(HELLO_HASH));
    }

    #[test]
    fn encode_data_is_base64_of_the_hash() {
        assert_eq!(encode_data(b"hello"), "qvTGHdzF6KLavt4PO0gs2a6pQ00=");
        assert_eq!(encode_data(b"hello"), Key(HELLO_HASH).to_string());
    }

    #[test]
    fn verify_content_detects_mismatches() {
        let target = hash_data(b"hello");

        assert!(verify_content(b"hello", &target));
        assert!(!verify_content(b"hello world", &target));
        assert!(!verify_content(b"", &target));
    }
}
