//! C7: the mined-status updater. Per-transaction "mark mined" requests are
//! folded into `max_mined_batch`-sized `set_mined_multi` calls by
//! `tower_batch::Batch`'s single owner task (§4.7), the same single-consumer
//! channel idiom `subtree-assembler::processor` uses for reads; a caller
//! confirming a whole block fans its requests out to that one worker with
//! bounded concurrency rather than waiting on them one at a time.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::stream::{self, StreamExt};
use store_iface::{MetaStore, StoreError};
use subtree_primitives::{Block, Hash};
use tower::{Service, ServiceExt};
use tower_batch::Batch;

use crate::{config::Config, error::SharedStoreError};

pub use crate::error::UpdaterError;

/// One transaction's pending mined-status update.
#[derive(Clone, Copy, Debug)]
pub struct MarkMinedRequest {
    pub hash: Hash,
    pub block_id: u32,
}

/// Wraps the external meta store as a `tower::Service<Vec<MarkMinedRequest>>`
/// so `tower_batch::Batch` can flush accumulated requests as one call.
/// Requests in a flush are grouped by `block_id` before calling
/// `set_mined_multi` — in practice a flush is almost always all one block,
/// since `mark_block_mined` submits a single block's hashes together.
struct MetaStoreBatchService {
    meta_store: Arc<dyn MetaStore>,
    config: Config,
}

impl Service<Vec<MarkMinedRequest>> for MetaStoreBatchService {
    type Response = ();
    type Error = SharedStoreError;
    type Future = Pin<Box<dyn Future<Output = Result<(), SharedStoreError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, requests: Vec<MarkMinedRequest>) -> Self::Future {
        let meta_store = self.meta_store.clone();
        let config = self.config;
        Box::pin(async move {
            let mut by_block: HashMap<u32, Vec<Hash>> = HashMap::new();
            for request in requests {
                by_block.entry(request.block_id).or_default().push(request.hash);
            }
            for (block_id, hashes) in by_block {
                set_mined_with_retry(meta_store.as_ref(), &hashes, block_id, &config).await?;
            }
            Ok(())
        })
    }
}

/// Calls `set_mined_multi`, retrying a failed attempt with backoff
/// `1 + 2 * retry` seconds up to `config.max_retries` times (§4.7).
async fn set_mined_with_retry(
    meta_store: &dyn MetaStore,
    hashes: &[Hash],
    block_id: u32,
    config: &Config,
) -> Result<(), SharedStoreError> {
    let mut attempt = 0u32;
    loop {
        match meta_store.set_mined_multi(hashes, block_id).await {
            Ok(()) => return Ok(()),
            Err(error) if attempt < config.max_retries => {
                let backoff = Duration::from_secs(1 + 2 * attempt as u64);
                tracing::warn!(
                    %error,
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    block_id,
                    "set_mined_multi failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(SharedStoreError::from(error)),
        }
    }
}

/// A handle to the mined-status updater's batch worker (§4.7). Cheaply
/// cloneable; every clone shares the same underlying worker task.
#[derive(Clone)]
pub struct MinedStatusUpdater {
    batch: Batch<MarkMinedRequest, (), SharedStoreError>,
    config: Config,
}

impl MinedStatusUpdater {
    /// Spawns the batch worker and returns a handle to it.
    pub fn new(meta_store: Arc<dyn MetaStore>, config: Config) -> Self {
        let service = MetaStoreBatchService { meta_store, config };
        let batch = Batch::new(service, config.max_mined_batch.max(1), config.max_mined_batch_latency());
        MinedStatusUpdater { batch, config }
    }

    /// Marks a single transaction mined in `block_id`.
    pub async fn mark_mined(&self, hash: Hash, block_id: u32) -> Result<(), UpdaterError> {
        let mut batch = self.batch.clone();
        batch.ready().await?.call(MarkMinedRequest { hash, block_id }).await?;
        Ok(())
    }

    /// Marks every non-coinbase transaction in `block` mined, fanned out
    /// with bounded concurrency (§4.7 "buffer_unordered(max_mined_routines)").
    /// The fan-out bound controls how many of *this* call's requests are in
    /// flight at once; the batch worker's own `max_mined_batch` still
    /// decides how many land in a single `set_mined_multi` call.
    pub async fn mark_block_mined(&self, block: &Block) -> Result<(), UpdaterError> {
        let block_id = block.id;
        let outcomes: Vec<Result<(), UpdaterError>> = stream::iter(block.iter_non_coinbase_nodes())
            .filter_map(|(subtree_index, node_index, _, node)| async move {
                if node.is_coinbase_placeholder() {
                    tracing::warn!(subtree_index, node_index, "coinbase placeholder outside (0, 0), ignoring");
                    None
                } else {
                    Some(node)
                }
            })
            .map(|node| self.mark_mined(node.hash, block_id))
            .buffer_unordered(self.config.max_mined_routines.max(1))
            .collect()
            .await;
        outcomes.into_iter().collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use store_iface::testing::MemoryMetaStore;
    use subtree_primitives::{BlockHeader, Subtree, SubtreeNode, Transaction, TxMeta};

    use super::*;

    fn config() -> Config {
        Config { max_mined_batch: 4, max_mined_batch_latency_millis: 5, max_retries: 2, ..Config::default() }
    }

    fn block_with_hashes(id: u32, hashes: &[u8]) -> Block {
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
            id,
            subtree_slices: vec![subtree],
        }
    }

    #[tokio::test]
    async fn mark_mined_records_the_block_id() {
        let meta_store = Arc::new(MemoryMetaStore::new());
        let hash = Hash([1u8; 32]);
        meta_store.insert(hash, TxMeta::new(0, 0, vec![], 0, false)).await;

        let updater = MinedStatusUpdater::new(meta_store.clone(), config());
        updater.mark_mined(hash, 7).await.unwrap();

        let meta = meta_store.get_meta(hash).await.unwrap();
        assert_eq!(meta.block_ids, vec![7]);
    }

    #[tokio::test]
    async fn mark_block_mined_covers_every_non_coinbase_node() {
        let meta_store = Arc::new(MemoryMetaStore::new());
        for byte in [1u8, 2, 3] {
            meta_store.insert(Hash([byte; 32]), TxMeta::new(0, 0, vec![], 0, false)).await;
        }

        let updater = MinedStatusUpdater::new(meta_store.clone(), config());
        let block = block_with_hashes(9, &[1, 2, 3]);
        updater.mark_block_mined(&block).await.unwrap();

        let mut chain = HashSet::new();
        chain.insert(9);
        for byte in [1u8, 2, 3] {
            let meta = meta_store.get_meta(Hash([byte; 32])).await.unwrap();
            assert!(meta.mined_on(&chain));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_transient_failure_is_retried_until_it_succeeds() {
        let meta_store = Arc::new(MemoryMetaStore::new());
        let hash = Hash([4u8; 32]);
        meta_store.insert(hash, TxMeta::new(0, 0, vec![], 0, false)).await;
        meta_store.fail_next_mined_calls(1).await;

        let mut fast_retry_config = config();
        fast_retry_config.max_retries = 3;
        let updater = MinedStatusUpdater::new(meta_store.clone(), fast_retry_config);

        updater.mark_mined(hash, 2).await.unwrap();
        let meta = meta_store.get_meta(hash).await.unwrap();
        assert_eq!(meta.block_ids, vec![2]);
    }

    #[tokio::test]
    async fn a_stray_placeholder_outside_subtree_zero_node_zero_is_skipped() {
        let meta_store = Arc::new(MemoryMetaStore::new());
        let hash = Hash([5u8; 32]);
        meta_store.insert(hash, TxMeta::new(0, 0, vec![], 0, false)).await;

        let mut subtree = Subtree::new(8).unwrap();
        subtree.add_coinbase_placeholder().unwrap();
        subtree.add_node(SubtreeNode::new(hash, 1, 1)).unwrap();
        // A second, stray placeholder landing after a real node.
        subtree.add_node(SubtreeNode::coinbase_placeholder()).unwrap();

        let block = Block {
            header: BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp: 0, bits: 0, nonce: 0 },
            coinbase_tx: Transaction::new_coinbase(2, 1, vec![]),
            tx_count: 3,
            size_bytes: 0,
            subtree_roots: vec![subtree.root_hash()],
            height: 1,
            id: 11,
            subtree_slices: vec![subtree],
        };

        let updater = MinedStatusUpdater::new(meta_store.clone(), config());
        updater.mark_block_mined(&block).await.unwrap();

        let meta = meta_store.get_meta(hash).await.unwrap();
        assert_eq!(meta.block_ids, vec![11]);

        // The stray placeholder's all-zero hash was never looked up.
        assert!(meta_store.get_meta(Hash::ZERO).await.is_err());
    }
}
