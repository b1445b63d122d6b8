//! §4.6 check 10: every non-coinbase node's hash must appear exactly once
//! across the block's subtrees. Also produces the position map (§8
//! ordering invariant `index_of`) that check 11 reuses to decide whether a
//! parent lives inside this same block.

use rayon::prelude::*;
use subtree_primitives::Block;

use crate::{error::BlockValidationError, sharded_map::ShardedTxMap};

/// Scans every non-coinbase node into a split-sharded map keyed by hash
/// (§5 "shared concurrent containers"), fanned out over `concurrency`
/// worker threads since the scan is CPU-bound over an in-memory block
/// (§4.6: "all per-subtree scans run in parallel up to
/// min(num_cpus, configured_limit)").
///
/// Returns the populated map on success, so the caller can reuse it for
/// check 11's parent-position lookups instead of rebuilding it.
pub fn check_no_duplicates(block: &Block, concurrency: usize) -> Result<ShardedTxMap, BlockValidationError> {
    let entries: Vec<(subtree_primitives::Hash, usize)> =
        block.iter_non_coinbase_nodes().into_iter().map(|(_, _, index, node)| (node.hash, index)).collect();

    let map = ShardedTxMap::new(concurrency.max(1).next_power_of_two());

    // Each chunk is sized so that `concurrency` chunks cover the whole
    // block; rayon's work-stealing pool then fans those chunks out across
    // its worker threads, each chunk taking one `put_multi` shard-lock
    // acquisition per shard it touches (§5 "shard-level lock for bulk
    // put_multi").
    let workers = concurrency.max(1);
    let chunk_size = ((entries.len() + workers - 1) / workers).max(1);

    let duplicate = entries
        .par_chunks(chunk_size)
        .map(|chunk| map.put_multi(chunk))
        .find_map_any(|duplicates| duplicates.into_iter().next());

    match duplicate {
        Some(hash) => Err(BlockValidationError::DuplicateTransaction(hash)),
        None => Ok(map),
    }
}

#[cfg(test)]
mod tests {
    use subtree_primitives::{BlockHeader, Hash, Subtree, SubtreeNode, Transaction};

    use super::*;

    fn block_with_nodes(hashes: &[u8]) -> Block {
        let mut subtree = Subtree::new(8).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        for byte in hashes {
            subtree.add_node(SubtreeNode::new(Hash([*byte; 32]), 1, 1)).unwrap();
        }

        Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 1 + hashes.len() as u64,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 1,
            id: 1,
            subtree_slices: vec![subtree],
        }
    }

    #[test]
    fn accepts_distinct_hashes_and_returns_positions() {
        let block = block_with_nodes(&[1, 2, 3]);
        let map = check_no_duplicates(&block, 4).unwrap();
        assert_eq!(map.position_of(&Hash([1u8; 32])), Some(0));
        assert_eq!(map.position_of(&Hash([3u8; 32])), Some(2));
    }

    #[test]
    fn rejects_a_repeated_hash() {
        let block = block_with_nodes(&[1, 2, 1]);
        let error = check_no_duplicates(&block, 4).unwrap_err();
        assert!(matches!(error, BlockValidationError::DuplicateTransaction(h) if h == Hash([1u8; 32])));
    }

    #[test]
    fn single_threaded_path_still_detects_duplicates() {
        let block = block_with_nodes(&[9, 9]);
        let error = check_no_duplicates(&block, 1).unwrap_err();
        assert!(matches!(error, BlockValidationError::DuplicateTransaction(h) if h == Hash([9u8; 32])));
    }
}
