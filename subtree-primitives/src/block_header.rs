//! The 80-byte, little-endian block header (§3 BlockHeader).

use std::io::{Read, Write};

use crate::{hash::Hash, serialization::SerializationError};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together by `prev_hash`: each header points
/// backwards to its parent, all the way to the genesis block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// The serialized length of a header, in bytes.
    pub const LEN: usize = 80;

    /// The block hash: double-SHA-256 of the 80-byte serialized header.
    pub fn hash(&self) -> Hash {
        let mut bytes = [0u8; Self::LEN];
        self.write(&mut bytes[..]).expect("writing to a fixed-size buffer never fails");
        Hash::hash(&bytes)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        writer.write_all(&self.version.to_le_bytes())?;
        self.prev_hash.write(&mut writer)?;
        self.merkle_root.write(&mut writer)?;
        writer.write_all(&self.timestamp.to_le_bytes())?;
        writer.write_all(&self.bits.to_le_bytes())?;
        writer.write_all(&self.nonce.to_le_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = read_u32(&mut reader)?;
        let prev_hash = Hash::read(&mut reader)?;
        let merkle_root = Hash::read(&mut reader)?;
        let timestamp = read_u32(&mut reader)?;
        let bits = read_u32(&mut reader)?;
        let nonce = read_u32(&mut reader)?;
        Ok(BlockHeader { version, prev_hash, merkle_root, timestamp, bits, nonce })
    }
}

fn read_u32<R: Read>(mut reader: R) -> Result<u32, SerializationError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockHeader {
        BlockHeader {
            version: 2,
            prev_hash: Hash([1u8; 32]),
            merkle_root: Hash([2u8; 32]),
            timestamp: 1_600_000_000,
            bits: 0x1d00ffff,
            nonce: 12345,
        }
    }

    #[test]
    fn round_trips_through_80_bytes() {
        let header = sample();
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), BlockHeader::LEN);

        let parsed = BlockHeader::read(&bytes[..]).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn hash_is_deterministic() {
        let header = sample();
        assert_eq!(header.hash(), header.hash());
    }

    #[test]
    fn different_headers_hash_differently() {
        let mut other = sample();
        other.nonce += 1;
        assert_ne!(sample().hash(), other.hash());
    }
}
