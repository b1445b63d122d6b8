//! C4: the binary block record — header, coinbase, and the list of
//! subtree roots it commits to (§3 Block, §4.4).

use std::io::{Read, Write};

use crate::{
    block_header::BlockHeader,
    hash::Hash,
    merkle,
    serialization::{read_compact_size, write_compact_size, SerializationError},
    subtree::Subtree,
    transaction::Transaction,
};

/// An error produced reading or validating a [`Block`]'s structure.
///
/// Distinct from consensus-rule failures (which live in `block-validator`):
/// this is about whether the bytes even parse into a well-formed block.
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum BlockError {
    /// {0}
    Serialization(#[from] SerializationError),
    /// block's first transaction is not a coinbase
    MissingCoinbase,
    /// subtree hash list contains a hash shorter than 32 bytes
    MalformedSubtreeHash,
}

/// A block: header, coinbase, and the roots of the subtrees that make up
/// its transaction set (§3 Block).
///
/// `subtree_slices` is populated lazily by the fetcher (C5) once the
/// subtrees named by `subtree_roots` have actually been retrieved from the
/// blob store; a freshly-parsed `Block` has an empty `subtree_slices`.
#[derive(Clone, Debug)]
pub struct Block {
    pub header: BlockHeader,
    pub coinbase_tx: Transaction,
    pub tx_count: u64,
    pub size_bytes: u64,
    pub subtree_roots: Vec<Hash>,
    pub height: u32,
    pub id: u32,
    pub subtree_slices: Vec<Subtree>,
}

impl Block {
    /// The minimum number of bytes a well-formed block can serialize to:
    /// the 80-byte header plus the smallest legal varint fields.
    pub const MIN_SERIALIZED_LEN: usize = 92;

    /// Parses a block from `reader`: 80-byte header, then varints
    /// `tx_count`, `size_bytes`, `subtree_count`, then `subtree_count * 32`
    /// bytes of subtree hashes, the varint-prefixed coinbase transaction,
    /// then a varint `height` (§4.4).
    pub fn from_reader<R: Read>(mut reader: R, id: u32) -> Result<Self, BlockError> {
        let header = BlockHeader::read(&mut reader)?;

        let tx_count = read_compact_size(&mut reader)?;
        let size_bytes = read_compact_size(&mut reader)?;
        let subtree_count = read_compact_size(&mut reader)?;

        let mut subtree_roots = Vec::with_capacity(subtree_count as usize);
        for _ in 0..subtree_count {
            subtree_roots.push(Hash::read(&mut reader)?);
        }

        let coinbase_tx = Transaction::read(&mut reader)?;
        if !coinbase_tx.is_coinbase() {
            return Err(BlockError::MissingCoinbase);
        }

        let height = read_compact_size(&mut reader)? as u32;

        Ok(Block {
            header,
            coinbase_tx,
            tx_count,
            size_bytes,
            subtree_roots,
            height,
            id,
            subtree_slices: Vec::new(),
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), BlockError> {
        self.header.write(&mut writer)?;
        write_compact_size(&mut writer, self.tx_count)?;
        write_compact_size(&mut writer, self.size_bytes)?;
        write_compact_size(&mut writer, self.subtree_roots.len() as u64)?;
        for root in &self.subtree_roots {
            root.write(&mut writer)?;
        }
        self.coinbase_tx.write(&mut writer)?;
        write_compact_size(&mut writer, self.height as u64)?;
        Ok(())
    }

    /// Recomputes the merkle root from `subtree_slices`, substituting the
    /// real coinbase hash for subtree 0's placeholder leaf, and compares
    /// it against `header.merkle_root` (§3 invariant (d), §4.4).
    ///
    /// Requires `subtree_slices` to already be populated (by C5) with one
    /// entry per `subtree_roots`, in order.
    pub fn check_merkle_root(&self) -> Result<(), BlockError> {
        if self.subtree_slices.len() != self.subtree_roots.len() {
            return Err(BlockError::Serialization(SerializationError::Parse(
                "subtree_slices must be populated before checking the merkle root",
            )));
        }

        let coinbase_hash = self.coinbase_tx.id();

        let mut roots = Vec::with_capacity(self.subtree_slices.len());
        for (index, subtree) in self.subtree_slices.iter().enumerate() {
            let root = if index == 0 {
                subtree.root_hash_at(coinbase_hash, 0)
            } else {
                subtree.root_hash()
            };
            roots.push(root);
        }

        let computed = merkle::merkle_root(&roots);
        if computed == self.header.merkle_root {
            Ok(())
        } else {
            Err(BlockError::Serialization(SerializationError::Parse("merkle root mismatch")))
        }
    }

    /// The set of subtree capacities present, excluding the (possibly
    /// smaller) trailing subtree — used by the validator to check that all
    /// subtrees but the last share one capacity (§4.6 check 6).
    pub fn subtree_capacities_consistent(&self) -> bool {
        if self.subtree_slices.len() <= 1 {
            return true;
        }
        let expected = self.subtree_slices[0].capacity();
        self.subtree_slices[..self.subtree_slices.len() - 1]
            .iter()
            .all(|s| s.capacity() == expected)
    }

    /// Every node across `subtree_slices` except the coinbase placeholder
    /// at (subtree 0, node 0), in block order, paired with its
    /// `(subtree_index, node_index, global_index)` position — the index
    /// space §8's ordering invariant (`index_of(P) < index_of(T)`) and
    /// §4.6 check 10's duplicate scan both operate over.
    pub fn iter_non_coinbase_nodes(&self) -> Vec<(usize, usize, usize, &crate::subtree::SubtreeNode)> {
        let mut global_index = 0usize;
        let mut out = Vec::new();
        for (subtree_index, subtree) in self.subtree_slices.iter().enumerate() {
            for (node_index, node) in subtree.nodes().iter().enumerate() {
                if subtree_index == 0 && node_index == 0 {
                    continue;
                }
                out.push((subtree_index, node_index, global_index, node));
                global_index += 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtree::SubtreeNode;
    use crate::transaction::TxOutput;

    fn sample_block() -> Block {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(Hash([1u8; 32]), 10, 200)).unwrap();

        let coinbase = Transaction::new_coinbase(2, 1, vec![TxOutput { value: 5_000_000_010, script_pubkey: vec![] }]);
        let root = subtree.root_hash_at(coinbase.id(), 0);

        let header = BlockHeader {
            version: 2,
            prev_hash: Hash::ZERO,
            merkle_root: root,
            timestamp: 1_600_000_000,
            bits: 0x1d00ffff,
            nonce: 0,
        };

        let mut block = Block {
            header,
            coinbase_tx: coinbase,
            tx_count: 2,
            size_bytes: 400,
            subtree_roots: vec![subtree.root_hash()],
            height: 1,
            id: 0,
            subtree_slices: vec![subtree],
        };
        block.id = 1;
        block
    }

    #[test]
    fn check_merkle_root_accepts_consistent_block() {
        let block = sample_block();
        assert!(block.check_merkle_root().is_ok());
    }

    #[test]
    fn check_merkle_root_rejects_tampered_header() {
        let mut block = sample_block();
        block.header.merkle_root = Hash([0xffu8; 32]);
        assert!(block.check_merkle_root().is_err());
    }

    #[test]
    fn round_trips_through_bytes() {
        let block = sample_block();
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();

        let mut parsed = Block::from_reader(&bytes[..], 7).unwrap();
        assert_eq!(parsed.header, block.header);
        assert_eq!(parsed.tx_count, block.tx_count);
        assert_eq!(parsed.subtree_roots, block.subtree_roots);
        assert_eq!(parsed.height, block.height);
        parsed.id = 1;
        assert_eq!(parsed.coinbase_tx, block.coinbase_tx);
    }

    #[test]
    fn from_reader_rejects_non_coinbase_first_tx() {
        let mut bytes = Vec::new();
        let header = BlockHeader {
            version: 1,
            prev_hash: Hash::ZERO,
            merkle_root: Hash::ZERO,
            timestamp: 0,
            bits: 0,
            nonce: 0,
        };
        header.write(&mut bytes).unwrap();
        write_compact_size(&mut bytes, 1).unwrap();
        write_compact_size(&mut bytes, 0).unwrap();
        write_compact_size(&mut bytes, 0).unwrap();

        let non_coinbase = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![],
            lock_time: 0,
        };
        non_coinbase.write(&mut bytes).unwrap();
        write_compact_size(&mut bytes, 0).unwrap();

        assert!(matches!(Block::from_reader(&bytes[..], 0), Err(BlockError::MissingCoinbase)));
    }

    #[test]
    fn iter_non_coinbase_nodes_skips_only_the_placeholder() {
        let block = sample_block();
        let nodes: Vec<_> = block.iter_non_coinbase_nodes();
        assert_eq!(nodes.len(), 1);
        let (subtree_index, node_index, global_index, node) = nodes[0];
        assert_eq!((subtree_index, node_index, global_index), (0, 1, 0));
        assert_eq!(node.hash, Hash([1u8; 32]));
    }
}
