//! The 32-byte content-addressing identifier used for transactions, subtrees
//! and blocks.

use std::{
    fmt,
    io::{self, Read, Write},
};

use sha2::{Digest, Sha256};

/// A SHA-256d (double SHA-256) hash.
///
/// Equality and hashing operate on the raw byte array. Bitcoin convention
/// displays a hash with its bytes reversed; `Hash` stores bytes in the order
/// they're used for comparisons, and only reverses them in `Display`/`Debug`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, serde::Serialize, serde::Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash used by the coinbase placeholder node.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Returns the double-SHA-256 hash of `data`.
    pub fn hash(data: &[u8]) -> Hash {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&second);
        Hash(bytes)
    }

    /// Builds a `Hash` from a raw, already-computed digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Hash {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interprets the first 8 bytes of the hash as a big-endian `u64`.
    ///
    /// Used verbatim by the Bloom-filter index (§4.8): the key is
    /// `u64::from_be_bytes(hash[0..8])`, chosen for bit-compatibility across
    /// implementations rather than any cryptographic property.
    pub fn bloom_key(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[0..8]);
        u64::from_be_bytes(buf)
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Hash> {
        let mut bytes = [0u8; 32];
        reader.read_exact(&mut bytes)?;
        Ok(Hash(bytes))
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash").field(&format!("{}", self)).finish()
    }
}

impl fmt::Display for Hash {
    /// Displays the hash reversed, matching Bitcoin's big-endian hex
    /// convention for human-readable tx/block ids.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}
