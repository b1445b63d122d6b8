//! §4.6 check 11: per-transaction lock-time maturity, parent ordering /
//! "blessing" on the current chain, and the Bloom already-mined cross-check
//! — the most store-bound of the eleven checks, so its fan-out concurrency
//! is sized for batched reads rather than CPU work (§4.6, §5).

use std::{collections::HashSet, time::Duration};

use futures::stream::{self, StreamExt};
use store_iface::{MetaStore, SubtreeFetcher};
use subtree_primitives::{Block, Hash, SubtreeMeta, TxMeta};

use crate::{
    bloom::BloomIndex, check::timestamp::median_time_past, config::Config, error::BlockValidationError,
    retry::retry_storage_call, sharded_map::ShardedTxMap,
};

/// Runs check 11 over every non-coinbase node in `block`, fanned out up to
/// `config.block_valid_order_and_blessed_concurrency` at a time.
///
/// `positions` is the map built by check 10 (`check_no_duplicates`),
/// reused here to decide in O(1) whether a parent hash lives inside this
/// same block rather than re-scanning subtree slices.
#[allow(clippy::too_many_arguments)]
pub async fn check_order_and_blessed(
    block: &Block,
    positions: &ShardedTxMap,
    fetcher: &dyn SubtreeFetcher,
    meta_store: &dyn MetaStore,
    bloom_index: &BloomIndex,
    current_chain_ids: &HashSet<u32>,
    recent_timestamps: &[u32],
    config: &Config,
) -> Result<(), BlockValidationError> {
    let mtp = median_time_past(recent_timestamps);

    // Subtree-meta sidecars are optional (§3, §4.5): a fetch failure here
    // just means we fall through to per-node meta-store lookups below.
    let metas: Vec<Option<SubtreeMeta>> = stream::iter(block.subtree_roots.iter().copied())
        .map(|root| async move { fetcher.fetch_meta(root).await.unwrap_or(None) })
        .buffered(config.block_get_and_validate_subtrees_concurrency.max(1))
        .collect()
        .await;

    let entries = block.iter_non_coinbase_nodes();

    let outcomes: Vec<Result<(), BlockValidationError>> = stream::iter(entries.into_iter())
        .map(|(subtree_index, node_index, global_index, node)| {
            let metas = &metas;
            async move {
                check_one(
                    node.hash,
                    subtree_index,
                    node_index,
                    global_index,
                    metas,
                    positions,
                    meta_store,
                    bloom_index,
                    current_chain_ids,
                    mtp,
                    block.height,
                    config,
                )
                .await
            }
        })
        .buffer_unordered(config.block_valid_order_and_blessed_concurrency.max(1))
        .collect()
        .await;

    outcomes.into_iter().collect::<Result<Vec<()>, _>>()?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn check_one(
    hash: Hash,
    subtree_index: usize,
    node_index: usize,
    global_index: usize,
    metas: &[Option<SubtreeMeta>],
    positions: &ShardedTxMap,
    meta_store: &dyn MetaStore,
    bloom_index: &BloomIndex,
    current_chain_ids: &HashSet<u32>,
    median_time_past: Option<u32>,
    block_height: u32,
    config: &Config,
) -> Result<(), BlockValidationError> {
    let meta = fetch_meta_with_retry(meta_store, hash, config).await?;

    check_lock_time(hash, meta.lock_time, block_height, median_time_past)?;

    let parents: Vec<Hash> = metas
        .get(subtree_index)
        .and_then(|m| m.as_ref())
        .and_then(|m| m.parent_tx_hashes.get(node_index))
        .cloned()
        .unwrap_or_else(|| meta.parent_tx_hashes.clone());

    for parent in parents {
        match positions.position_of(&parent) {
            Some(parent_index) => {
                if parent_index >= global_index {
                    return Err(BlockValidationError::ComesBeforeParent { child: hash, parent });
                }
            }
            None => {
                let parent_meta = fetch_meta_with_retry(meta_store, parent, config).await?;
                if !parent_meta.mined_on(current_chain_ids) {
                    return Err(BlockValidationError::ParentNotMined { tx: hash, parent });
                }
            }
        }
    }

    // Already-mined cross-check (§4.8): the child's own meta, already
    // fetched above, is the same record a Bloom hit would be confirmed
    // against, so no extra store round trip is needed here.
    let already_mined = bloom_index.probe_and_confirm(hash, |_| async { meta.mined_on(current_chain_ids) }).await;
    if already_mined {
        return Err(BlockValidationError::AlreadyMined(hash));
    }

    Ok(())
}

fn check_lock_time(
    hash: Hash,
    lock_time: u32,
    block_height: u32,
    median_time_past: Option<u32>,
) -> Result<(), BlockValidationError> {
    if lock_time == 0 {
        return Ok(());
    }

    let matured = if lock_time < 500_000_000 {
        lock_time < block_height
    } else {
        median_time_past.is_some_and(|mtp| lock_time < mtp)
    };

    if matured {
        Ok(())
    } else {
        Err(BlockValidationError::ImmatureLockTime(hash))
    }
}

async fn fetch_meta_with_retry(meta_store: &dyn MetaStore, hash: Hash, config: &Config) -> Result<TxMeta, BlockValidationError> {
    retry_storage_call(
        Duration::from_millis(config.fetch_initial_backoff_millis),
        Duration::from_millis(config.fetch_max_backoff_millis),
        config.fetch_max_attempts,
        || meta_store.get_meta(hash),
    )
    .await
    .map_err(BlockValidationError::Storage)
}

#[cfg(test)]
mod tests {
    use store_iface::testing::{MemoryMetaStore, NullSubtreeFetcher};
    use subtree_primitives::{BlockHeader, Subtree, SubtreeNode, Transaction};

    use super::*;
    use crate::check::duplicates::check_no_duplicates;

    fn block_with(parent: Hash, child: Hash) -> Block {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(parent, 0, 1)).unwrap();
        subtree.add_node(SubtreeNode::new(child, 0, 1)).unwrap();

        Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 3,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 10,
            id: 1,
            subtree_slices: vec![subtree],
        }
    }

    fn config() -> Config {
        Config { block_valid_order_and_blessed_concurrency: 4, block_get_and_validate_subtrees_concurrency: 4, ..Config::default() }
    }

    #[tokio::test]
    async fn accepts_a_parent_earlier_in_the_same_block() {
        let parent = Hash([1u8; 32]);
        let child = Hash([2u8; 32]);
        let block = block_with(parent, child);
        let positions = check_no_duplicates(&block, 2).unwrap();

        let meta_store = MemoryMetaStore::new();
        meta_store.insert(child, TxMeta::new(0, 0, vec![parent], 0, false)).await;
        meta_store.insert(parent, TxMeta::new(0, 0, vec![], 0, false)).await;

        let bloom = BloomIndex::new(4);
        let chain_ids = HashSet::new();

        check_order_and_blessed(&block, &positions, &NullSubtreeFetcher, &meta_store, &bloom, &chain_ids, &[], &config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_a_child_ordered_before_its_parent() {
        let parent = Hash([1u8; 32]);
        let child = Hash([2u8; 32]);
        // parent is node index 1, child is node index 0 in storage order below.
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(child, 0, 1)).unwrap();
        subtree.add_node(SubtreeNode::new(parent, 0, 1)).unwrap();
        let block = Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 3,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 10,
            id: 1,
            subtree_slices: vec![subtree],
        };
        let positions = check_no_duplicates(&block, 2).unwrap();

        let meta_store = MemoryMetaStore::new();
        meta_store.insert(child, TxMeta::new(0, 0, vec![parent], 0, false)).await;
        meta_store.insert(parent, TxMeta::new(0, 0, vec![], 0, false)).await;

        let bloom = BloomIndex::new(4);
        let chain_ids = HashSet::new();

        let error = check_order_and_blessed(&block, &positions, &NullSubtreeFetcher, &meta_store, &bloom, &chain_ids, &[], &config())
            .await
            .unwrap_err();
        assert!(matches!(error, BlockValidationError::ComesBeforeParent { child: c, parent: p } if c == child && p == parent));
    }

    #[tokio::test]
    async fn rejects_an_external_parent_not_mined_on_this_chain() {
        let parent = Hash([9u8; 32]);
        let child = Hash([2u8; 32]);
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(child, 0, 1)).unwrap();
        let block = Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 2,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 10,
            id: 1,
            subtree_slices: vec![subtree],
        };
        let positions = check_no_duplicates(&block, 2).unwrap();

        let meta_store = MemoryMetaStore::new();
        meta_store.insert(child, TxMeta::new(0, 0, vec![parent], 0, false)).await;
        let mut parent_meta = TxMeta::new(0, 0, vec![], 0, false);
        parent_meta.block_ids = vec![999]; // mined, but not on our chain
        meta_store.insert(parent, parent_meta).await;

        let bloom = BloomIndex::new(4);
        let mut chain_ids = HashSet::new();
        chain_ids.insert(1u32);

        let error = check_order_and_blessed(&block, &positions, &NullSubtreeFetcher, &meta_store, &bloom, &chain_ids, &[], &config())
            .await
            .unwrap_err();
        assert!(matches!(error, BlockValidationError::ParentNotMined { tx, parent: p } if tx == child && p == parent));
    }

    #[tokio::test]
    async fn accepts_a_trusted_genesis_import_parent() {
        let parent = Hash([9u8; 32]);
        let child = Hash([2u8; 32]);
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(child, 0, 1)).unwrap();
        let block = Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 2,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 10,
            id: 1,
            subtree_slices: vec![subtree],
        };
        let positions = check_no_duplicates(&block, 2).unwrap();

        let meta_store = MemoryMetaStore::new();
        meta_store.insert(child, TxMeta::new(0, 0, vec![parent], 0, false)).await;
        let mut parent_meta = TxMeta::new(0, 0, vec![], 0, false);
        parent_meta.block_ids = vec![subtree_primitives::GENESIS_BLOCK_ID];
        meta_store.insert(parent, parent_meta).await;

        let bloom = BloomIndex::new(4);
        let chain_ids = HashSet::new();

        check_order_and_blessed(&block, &positions, &NullSubtreeFetcher, &meta_store, &bloom, &chain_ids, &[], &config())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_an_immature_absolute_lock_time() {
        let hash = Hash([3u8; 32]);
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(hash, 0, 1)).unwrap();
        let block = Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 2,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 5,
            id: 1,
            subtree_slices: vec![subtree],
        };
        let positions = check_no_duplicates(&block, 2).unwrap();

        let meta_store = MemoryMetaStore::new();
        meta_store.insert(hash, TxMeta::new(0, 0, vec![], 10, false)).await; // lock_time 10 >= height 5

        let bloom = BloomIndex::new(4);
        let chain_ids = HashSet::new();

        let error = check_order_and_blessed(&block, &positions, &NullSubtreeFetcher, &meta_store, &bloom, &chain_ids, &[], &config())
            .await
            .unwrap_err();
        assert!(matches!(error, BlockValidationError::ImmatureLockTime(h) if h == hash));
    }

    #[tokio::test]
    async fn bloom_hit_confirmed_by_meta_fails_the_block() {
        let hash = Hash([4u8; 32]);
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(hash, 0, 1)).unwrap();
        let block = Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 2,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 10,
            id: 1,
            subtree_slices: vec![subtree],
        };
        let positions = check_no_duplicates(&block, 2).unwrap();

        let meta_store = MemoryMetaStore::new();
        let mut meta = TxMeta::new(0, 0, vec![], 0, false);
        meta.block_ids = vec![1];
        meta_store.insert(hash, meta).await;

        let mut bloom = BloomIndex::new(4);
        bloom.insert(Hash([7u8; 32]), crate::bloom::BlockBloomFilter::from_hashes(std::iter::once(hash), 1e-6));

        let mut chain_ids = HashSet::new();
        chain_ids.insert(1u32);

        let error = check_order_and_blessed(&block, &positions, &NullSubtreeFetcher, &meta_store, &bloom, &chain_ids, &[], &config())
            .await
            .unwrap_err();
        assert!(matches!(error, BlockValidationError::AlreadyMined(h) if h == hash));
    }
}
