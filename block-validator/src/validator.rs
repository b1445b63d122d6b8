//! Ties the eleven (plus stubbed twelfth) checks of `check` into one
//! ordered, early-exiting pipeline (§4.6).

use std::{collections::HashSet, sync::Arc};

use store_iface::{MetaStore, SubtreeFetcher};
use subtree_primitives::Block;
use tokio::sync::RwLock;

use crate::{
    bloom::BloomIndex,
    check::{
        bip34::check_bip34_height,
        coinbase::check_coinbase_present,
        conflicting::{check_conflicting_transactions, ConflictReport},
        duplicates::check_no_duplicates,
        merkle::check_merkle_root,
        order_and_blessed::check_order_and_blessed,
        pow::check_proof_of_work,
        reward::check_reward,
        subtrees::fetch_and_validate_subtrees,
        timestamp::{check_future_time, check_median_time_past},
    },
    config::Config,
    error::BlockValidationError,
};

/// Per-call context that changes with chain state but outlives any single
/// `Validator` (current best-chain block ids, recent timestamps for
/// median-time-past, and wall-clock `now`).
///
/// Kept separate from [`Validator`] itself so the caller can refresh chain
/// state (e.g. after a reorg) without reconstructing the fetcher/meta-store
/// handles.
#[derive(Clone, Debug, Default)]
pub struct ValidationContext {
    pub current_chain_ids: HashSet<u32>,
    pub recent_timestamps: Vec<u32>,
    pub now: u32,
}

/// Runs the full check pipeline against a candidate block (§4.6).
///
/// Holds the collaborators named in §6 behind trait objects; constructed
/// once per node and shared across every block it validates.
pub struct Validator {
    fetcher: Arc<dyn SubtreeFetcher>,
    meta_store: Arc<dyn MetaStore>,
    bloom_index: Arc<RwLock<BloomIndex>>,
    config: Config,
}

impl Validator {
    pub fn new(fetcher: Arc<dyn SubtreeFetcher>, meta_store: Arc<dyn MetaStore>, bloom_index: Arc<RwLock<BloomIndex>>, config: Config) -> Self {
        Validator { fetcher, meta_store, bloom_index, config }
    }

    /// Validates `block` against all eleven consensus checks in order,
    /// returning on the first failure (§4.6 "early-exit on the first
    /// failure"). On success, also returns the stubbed check 12 report
    /// (§9) for the caller to log or persist, and the populated duplicate
    /// map check 10 built along the way.
    pub async fn validate(&self, block: &mut Block, context: &ValidationContext) -> Result<ConflictReport, BlockValidationError> {
        check_proof_of_work(&block.header)?;
        check_future_time(&block.header, context.now)?;
        check_median_time_past(&block.header, &context.recent_timestamps);
        check_coinbase_present(block)?;
        check_bip34_height(block)?;

        fetch_and_validate_subtrees(
            block,
            self.fetcher.as_ref(),
            self.config.leaf_capacity,
            self.config.block_get_and_validate_subtrees_concurrency,
        )
        .await?;

        check_merkle_root(block)?;
        check_reward(block)?;

        let positions = check_no_duplicates(block, self.config.block_check_duplicate_transactions_concurrency)?;

        let bloom_index = self.bloom_index.read().await;
        check_order_and_blessed(
            block,
            &positions,
            self.fetcher.as_ref(),
            self.meta_store.as_ref(),
            &bloom_index,
            &context.current_chain_ids,
            &context.recent_timestamps,
            &self.config,
        )
        .await?;
        drop(bloom_index);

        Ok(check_conflicting_transactions(block))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use async_trait::async_trait;
    use store_iface::{testing::{MemoryMetaStore, NullSubtreeFetcher}, StoreError};
    use subtree_primitives::{transaction::TxOutput, work::block_subsidy, BlockHeader, Hash, Subtree, SubtreeMeta, SubtreeNode, Transaction, TxMeta};
    use tokio::sync::RwLock;

    use super::*;

    /// Serves subtrees straight out of an in-memory map, standing in for a
    /// populated blob store in tests that need `fetch_and_validate_subtrees`
    /// to succeed without exercising C5's retry plumbing.
    struct FixedSubtreeFetcher {
        subtrees: HashMap<Hash, Subtree>,
    }

    impl FixedSubtreeFetcher {
        fn new(subtrees: Vec<Subtree>) -> Self {
            FixedSubtreeFetcher { subtrees: subtrees.into_iter().map(|s| (s.root_hash(), s)).collect() }
        }
    }

    #[async_trait]
    impl SubtreeFetcher for FixedSubtreeFetcher {
        async fn fetch(&self, hash: Hash, _leaf_capacity: u64) -> Result<Subtree, StoreError> {
            self.subtrees.get(&hash).cloned().ok_or_else(|| StoreError::not_found(format!("no subtree {hash}")))
        }

        async fn fetch_meta(&self, _hash: Hash) -> Result<Option<SubtreeMeta>, StoreError> {
            Ok(None)
        }
    }

    fn valid_block() -> Block {
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(Hash([1u8; 32]), 0, 200)).unwrap();

        let subsidy = block_subsidy(1);
        let coinbase = Transaction::new_coinbase(2, 1, vec![TxOutput { value: subsidy, script_pubkey: vec![] }]);
        let root = subtree.root_hash_at(coinbase.id(), 0);

        Block {
            // bits chosen so `hash_meets_target` takes its "exponent far past 32"
            // overflow branch and returns the maximum target, passing regardless
            // of the header's actual computed hash.
            header: BlockHeader { version: 1, prev_hash: Hash::ZERO, merkle_root: root, timestamp: 0, bits: 0x2100_0001, nonce: 0 },
            coinbase_tx: coinbase,
            tx_count: 2,
            size_bytes: 400,
            subtree_roots: vec![subtree.root_hash()],
            height: 1,
            id: 1,
            subtree_slices: vec![subtree],
        }
    }

    fn config() -> Config {
        Config {
            block_valid_order_and_blessed_concurrency: 4,
            block_check_duplicate_transactions_concurrency: 2,
            block_get_and_validate_subtrees_concurrency: 2,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn accepts_a_fully_valid_block() {
        let meta_store = Arc::new(MemoryMetaStore::new());
        meta_store.insert(Hash([1u8; 32]), TxMeta::new(0, 200, vec![], 0, false)).await;

        let mut block = valid_block();
        let fetcher = FixedSubtreeFetcher::new(block.subtree_slices.clone());

        let validator = Validator::new(Arc::new(fetcher), meta_store, Arc::new(RwLock::new(BloomIndex::new(4))), config());

        let context = ValidationContext { current_chain_ids: HashSet::new(), recent_timestamps: vec![], now: 1_000_000_000 };

        validator.validate(&mut block, &context).await.unwrap();
    }

    #[tokio::test]
    async fn fails_fast_on_insufficient_work_before_touching_storage() {
        let validator = Validator::new(
            Arc::new(NullSubtreeFetcher),
            Arc::new(MemoryMetaStore::new()),
            Arc::new(RwLock::new(BloomIndex::new(4))),
            config(),
        );

        let mut block = valid_block();
        block.header.bits = 0x03000001; // impossibly small target
        let context = ValidationContext { current_chain_ids: HashSet::new(), recent_timestamps: vec![], now: 1_000_000_000 };

        let error = validator.validate(&mut block, &context).await.unwrap_err();
        assert!(matches!(error, BlockValidationError::InsufficientWork));
    }

    #[tokio::test]
    async fn rejects_a_block_whose_coinbase_overclaims() {
        let meta_store = Arc::new(MemoryMetaStore::new());
        meta_store.insert(Hash([1u8; 32]), TxMeta::new(0, 200, vec![], 0, false)).await;

        let mut block = valid_block();
        block.coinbase_tx.outputs[0].value += 1;
        // Re-derive the merkle root so we fail at the reward check, not the merkle check.
        let root = block.subtree_slices[0].root_hash_at(block.coinbase_tx.id(), 0);
        block.header.merkle_root = root;

        let fetcher = FixedSubtreeFetcher::new(block.subtree_slices.clone());
        let validator = Validator::new(Arc::new(fetcher), meta_store, Arc::new(RwLock::new(BloomIndex::new(4))), config());

        let context = ValidationContext { current_chain_ids: HashSet::new(), recent_timestamps: vec![], now: 1_000_000_000 };

        let error = validator.validate(&mut block, &context).await.unwrap_err();
        assert!(matches!(error, BlockValidationError::CoinbaseOverClaim { .. }));
    }
}
