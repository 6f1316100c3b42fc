//! 160 bit keys identifying peers and values on the network.

use std::convert::TryInto;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// The size of keys in bytes.
pub const KEY_SIZE: usize = 20;
/// The size of keys in bits.
pub const KEY_BITS: usize = KEY_SIZE * 8;

/// A 160 bit key in the XOR metric space.
///
/// Keys name both peers and values. Comparison treats a key as a big
/// endian unsigned integer.
#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct Key(pub [u8; KEY_SIZE]);

impl Key {
    /// Generates a random Key.
    pub fn random() -> Key {
        let mut rng = rand::thread_rng();
        let bytes: [u8; KEY_SIZE] = rng.gen();

        Key(bytes)
    }

    /// Creates a Key from its raw bytes. Returns Err if `bytes` is not
    /// of length [KEY_SIZE].
    pub fn from_bytes(bytes: &[u8]) -> Result<Key, KeyError> {
        let bytes: [u8; KEY_SIZE] = match bytes.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return Err(KeyError::InvalidKeySize(bytes.len())),
        };

        Ok(Key(bytes))
    }

    /// XOR distance between this key and another.
    pub fn distance(&self, other: &Key) -> Key {
        let mut bytes = [0u8; KEY_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Key(bytes)
    }

    /// Number of leading zero bits, capped at [KEY_BITS] - 1 so the all
    /// zero key still maps to a valid bit offset.
    pub fn prefix_length(&self) -> usize {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return i * 8 + byte_prefix_length(*byte);
            }
        }

        (KEY_SIZE - 1) * 8 + byte_prefix_length(0)
    }

    /// Indices of the set bits, counted from the least significant end
    /// and returned most significant first: `00100101` maps to `[5, 2, 0]`.
    pub fn set_bit_indices(&self) -> Vec<usize> {
        let mut indices = Vec::new();

        for (i, byte) in self.0.iter().enumerate() {
            for j in (0..8).rev() {
                if byte & (1 << j) != 0 {
                    indices.push((KEY_SIZE - 1 - i) * 8 + j);
                }
            }
        }

        indices
    }
}

/// Number of leading zero bits in a byte, capped at 7 so a zero byte
/// still maps to a valid bit offset.
pub fn byte_prefix_length(byte: u8) -> usize {
    (byte.leading_zeros() as usize).min(7)
}

impl Display for Key {
    /// Standard base64 with padding.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", general_purpose::STANDARD.encode(self.0))
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Key, KeyError> {
        let bytes = general_purpose::STANDARD.decode(s)?;

        Key::from_bytes(&bytes)
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("Invalid key size {0}, expected 20 bytes")]
    InvalidKeySize(usize),

    #[error("Invalid key encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}
