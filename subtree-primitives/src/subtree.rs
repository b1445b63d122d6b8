//! C1: the fixed-capacity merkle leaf partition of a block's transaction
//! tree (§3 Subtree, §4.1).

use std::{
    collections::HashSet,
    io::{Read, Write},
};

use crate::{
    hash::Hash,
    merkle,
    serialization::{read_compact_size, write_compact_size, SerializationError},
};

/// One leaf of a subtree: a transaction hash plus the fee and size it
/// contributes to the subtree's running totals.
///
/// Identity is the hash alone; two nodes with the same hash but different
/// fee/size bookkeeping are still considered the same node.
#[derive(Clone, Copy, Debug)]
pub struct SubtreeNode {
    pub hash: Hash,
    pub fee: u64,
    pub size_bytes: u64,
}

impl PartialEq for SubtreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
impl Eq for SubtreeNode {}

impl std::hash::Hash for SubtreeNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state)
    }
}

impl SubtreeNode {
    pub fn new(hash: Hash, fee: u64, size_bytes: u64) -> Self {
        SubtreeNode { hash, fee, size_bytes }
    }

    /// The distinguished placeholder that stands in for the coinbase
    /// transaction at position 0 of the block's first subtree: zero hash,
    /// zero fee, zero size.
    pub fn coinbase_placeholder() -> Self {
        SubtreeNode { hash: Hash::ZERO, fee: 0, size_bytes: 0 }
    }

    pub fn is_coinbase_placeholder(&self) -> bool {
        self.hash.is_zero()
    }
}

/// An error produced mutating a [`Subtree`].
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum SubtreeError {
    /// subtree is already at its leaf capacity ({0})
    Full(u64),
    /// subtree capacity must be a power of two, got {0}
    InvalidCapacity(u64),
}

/// A fixed-capacity, power-of-two merkle segment of a block's transaction
/// tree (§3).
///
/// Once `len() == capacity()` the subtree is complete and, by convention of
/// every caller in this crate, never mutated again: completeness is not
/// enforced by the type itself (the processor owns that invariant), but
/// `add_node` refuses to push past capacity.
#[derive(Clone, Debug)]
pub struct Subtree {
    capacity: u64,
    nodes: Vec<SubtreeNode>,
    fees: u64,
    size_bytes: u64,
    /// Nodes whose spends conflict with another node already accepted on
    /// this chain. Collected for future enforcement only; see §9 Open
    /// Question — `check_conflicting_transactions` never invalidates a
    /// block on their presence today.
    conflicting_nodes: HashSet<Hash>,
}

impl Subtree {
    /// The reserved header size at the front of a serialized subtree file.
    pub const SERIALIZED_HEADER_LEN: usize = 48;

    pub fn new(leaf_capacity: u64) -> Result<Self, SubtreeError> {
        if leaf_capacity == 0 || !leaf_capacity.is_power_of_two() {
            return Err(SubtreeError::InvalidCapacity(leaf_capacity));
        }
        Ok(Subtree {
            capacity: leaf_capacity,
            nodes: Vec::with_capacity(leaf_capacity as usize),
            fees: 0,
            size_bytes: 0,
            conflicting_nodes: HashSet::new(),
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.nodes.len() as u64 >= self.capacity
    }

    pub fn fees(&self) -> u64 {
        self.fees
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn nodes(&self) -> &[SubtreeNode] {
        &self.nodes
    }

    pub fn conflicting_nodes(&self) -> &HashSet<Hash> {
        &self.conflicting_nodes
    }

    pub fn mark_conflicting(&mut self, hash: Hash) {
        self.conflicting_nodes.insert(hash);
    }

    /// Appends `node`, updating the running fee and size totals.
    ///
    /// Returns [`SubtreeError::Full`] if the subtree is already at
    /// capacity; the caller (C3) treats this as a non-fatal, logged error
    /// (§4.3 Failure semantics) rather than corrupting in-flight state.
    pub fn add_node(&mut self, node: SubtreeNode) -> Result<(), SubtreeError> {
        if self.is_complete() {
            return Err(SubtreeError::Full(self.capacity));
        }
        self.fees += node.fee;
        self.size_bytes += node.size_bytes;
        self.nodes.push(node);
        Ok(())
    }

    /// Convenience for inserting the coinbase placeholder at the current
    /// position (meant to be position 0 of a block's first subtree).
    pub fn add_coinbase_placeholder(&mut self) -> Result<(), SubtreeError> {
        self.add_node(SubtreeNode::coinbase_placeholder())
    }

    /// The merkle root of this subtree's nodes, padding up to `capacity`
    /// with copies of the last node when `len < capacity` (§4.1).
    pub fn root_hash(&self) -> Hash {
        self.root_hash_with_replace(None)
    }

    /// Like [`Subtree::root_hash`], but first substitutes `replacement` in
    /// for the node at `index` (used to swap the coinbase placeholder for
    /// the real coinbase hash before recomputing subtree 0's root, §4.4).
    pub fn root_hash_at(&self, replacement: Hash, index: usize) -> Hash {
        self.root_hash_with_replace(Some((index, replacement)))
    }

    fn root_hash_with_replace(&self, replace: Option<(usize, Hash)>) -> Hash {
        if self.nodes.is_empty() {
            return Hash::ZERO;
        }

        let mut leaves: Vec<Hash> = self.nodes.iter().map(|n| n.hash).collect();
        if let Some((index, replacement)) = replace {
            if let Some(slot) = leaves.get_mut(index) {
                *slot = replacement;
            }
        }

        let last = *leaves.last().expect("checked non-empty above");
        while (leaves.len() as u64) < self.capacity {
            leaves.push(last);
        }

        merkle::merkle_root(&leaves)
    }

    /// Returns the nodes of this subtree whose hash is *not* a key of
    /// `known`, preserving order. Used by the processor to refill nodes
    /// that a newly-accepted block's subtrees don't already contain
    /// (§4.3 `move_up` step 5, `process_remainder`).
    pub fn difference<'a>(&'a self, known: &HashSet<Hash>) -> Vec<&'a SubtreeNode> {
        self.nodes.iter().filter(|n| !known.contains(&n.hash)).collect()
    }

    /// Serializes this subtree: a reserved 48-byte header, an 8-byte
    /// little-endian leaf count, then per leaf `{hash:32, fee:u64,
    /// size:u64}` (§4.1).
    pub fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        let header = [0u8; Self::SERIALIZED_HEADER_LEN];
        writer.write_all(&header)?;
        writer.write_all(&(self.nodes.len() as u64).to_le_bytes())?;
        for node in &self.nodes {
            node.hash.write(&mut writer)?;
            writer.write_all(&node.fee.to_le_bytes())?;
            writer.write_all(&node.size_bytes.to_le_bytes())?;
        }
        Ok(())
    }

    /// Deserializes a subtree of the given `leaf_capacity` from `reader`.
    pub fn deserialize<R: Read>(mut reader: R, leaf_capacity: u64) -> Result<Self, SerializationError> {
        let mut header = [0u8; Self::SERIALIZED_HEADER_LEN];
        reader.read_exact(&mut header)?;

        let mut count_bytes = [0u8; 8];
        reader.read_exact(&mut count_bytes)?;
        let count = u64::from_le_bytes(count_bytes);

        let mut subtree = Subtree::new(leaf_capacity)
            .map_err(|_| SerializationError::Parse("invalid subtree capacity"))?;

        for _ in 0..count {
            let hash = Hash::read(&mut reader)?;
            let mut fee_bytes = [0u8; 8];
            reader.read_exact(&mut fee_bytes)?;
            let mut size_bytes = [0u8; 8];
            reader.read_exact(&mut size_bytes)?;
            subtree
                .add_node(SubtreeNode::new(
                    hash,
                    u64::from_le_bytes(fee_bytes),
                    u64::from_le_bytes(size_bytes),
                ))
                .map_err(|_| SerializationError::Parse("subtree file exceeds its own capacity"))?;
        }

        Ok(subtree)
    }
}

/// Per-node parent transaction hashes, persisted alongside a subtree file
/// under the `.meta` extension (§3 Subtree meta, §4.5).
#[derive(Clone, Debug, Default)]
pub struct SubtreeMeta {
    /// Indexed in lockstep with the owning subtree's `nodes()`.
    pub parent_tx_hashes: Vec<Vec<Hash>>,
}

impl SubtreeMeta {
    pub fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        write_compact_size(&mut writer, self.parent_tx_hashes.len() as u64)?;
        for parents in &self.parent_tx_hashes {
            write_compact_size(&mut writer, parents.len() as u64)?;
            for parent in parents {
                parent.write(&mut writer)?;
            }
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let node_count = read_compact_size(&mut reader)?;
        let mut parent_tx_hashes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let parent_count = read_compact_size(&mut reader)?;
            let mut parents = Vec::with_capacity(parent_count as usize);
            for _ in 0..parent_count {
                parents.push(Hash::read(&mut reader)?);
            }
            parent_tx_hashes.push(parents);
        }
        Ok(SubtreeMeta { parent_tx_hashes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(byte: u8, fee: u64) -> SubtreeNode {
        SubtreeNode::new(Hash([byte; 32]), fee, 250)
    }

    #[test]
    fn rejects_non_power_of_two_capacity() {
        assert!(Subtree::new(3).is_err());
        assert!(Subtree::new(4).is_ok());
    }

    #[test]
    fn add_node_tracks_running_totals() {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_node(node(1, 100)).unwrap();
        subtree.add_node(node(2, 200)).unwrap();
        assert_eq!(subtree.fees(), 300);
        assert_eq!(subtree.size_bytes(), 500);
        assert_eq!(subtree.len(), 2);
    }

    #[test]
    fn add_node_refuses_past_capacity() {
        let mut subtree = Subtree::new(1).unwrap();
        subtree.add_node(node(1, 0)).unwrap();
        assert!(matches!(subtree.add_node(node(2, 0)), Err(SubtreeError::Full(1))));
    }

    #[test]
    fn is_complete_once_full() {
        let mut subtree = Subtree::new(2).unwrap();
        assert!(!subtree.is_complete());
        subtree.add_node(node(1, 0)).unwrap();
        subtree.add_node(node(2, 0)).unwrap();
        assert!(subtree.is_complete());
    }

    #[test]
    fn root_hash_pads_incomplete_subtree_by_duplicating_last_node() {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_node(node(1, 0)).unwrap();
        subtree.add_node(node(2, 0)).unwrap();
        subtree.add_node(node(3, 0)).unwrap();

        let explicit = {
            let mut full = Subtree::new(4).unwrap();
            full.add_node(node(1, 0)).unwrap();
            full.add_node(node(2, 0)).unwrap();
            full.add_node(node(3, 0)).unwrap();
            full.add_node(node(3, 0)).unwrap();
            full.root_hash()
        };

        assert_eq!(subtree.root_hash(), explicit);
    }

    #[test]
    fn root_hash_at_substitutes_coinbase() {
        let mut subtree = Subtree::new(2).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(node(2, 0)).unwrap();

        let with_placeholder = subtree.root_hash();
        let coinbase_hash = Hash([9u8; 32]);
        let with_real_coinbase = subtree.root_hash_at(coinbase_hash, 0);
        assert_ne!(with_placeholder, with_real_coinbase);
    }

    #[test]
    fn serialize_round_trips() {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(node(7, 500)).unwrap();

        let mut bytes = Vec::new();
        subtree.serialize(&mut bytes).unwrap();

        let parsed = Subtree::deserialize(&bytes[..], 4).unwrap();
        assert_eq!(parsed.len(), subtree.len());
        assert_eq!(parsed.fees(), subtree.fees());
        assert_eq!(parsed.root_hash(), subtree.root_hash());
    }

    #[test]
    fn difference_excludes_known_hashes() {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_node(node(1, 0)).unwrap();
        subtree.add_node(node(2, 0)).unwrap();

        let mut known = HashSet::new();
        known.insert(Hash([1u8; 32]));

        let remaining = subtree.difference(&known);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash, Hash([2u8; 32]));
    }
}
