//! Process wiring: builds the standalone collaborators (§9 "Polymorphic
//! store" notes that real backends are out of scope, §1) and spawns the
//! owner tasks of C3 and C7.

use std::sync::Arc;

use block_validator::{BloomIndex, SubtreeFetchService, Validator};
use mined_status::MinedStatusUpdater;
use store_iface::testing::{MemoryBlobStore, MemoryMetaStore};
use subtree_assembler::ProcessorHandle;
use tokio::sync::RwLock;

use crate::config::NodeConfig;

/// Every long-lived handle the node needs to process transactions and
/// validate blocks. Held by `main` for the life of the process; each
/// field is independently cloneable/shareable.
pub struct Node {
    pub processor: ProcessorHandle,
    pub intake: subtree_assembler::IntakeSender,
    pub notifications: tokio::sync::mpsc::UnboundedReceiver<subtree_primitives::Subtree>,
    pub validator: Arc<Validator>,
    pub mined_status: MinedStatusUpdater,
}

/// Assembles the node's collaborators and spawns the subtree processor's
/// owner task (§4.3).
///
/// The blob and meta stores are external collaborators whose real
/// backends are out of scope (§1); this standalone binary wires the same
/// in-memory doubles the workspace's own test suites use
/// (`store_iface::testing`) so the process is runnable end to end
/// without a configured remote store. A production deployment swaps
/// these two `Arc`s for real backends behind the same `BlobStore`/
/// `MetaStore` traits — no other wiring here changes.
pub fn build(config: &NodeConfig) -> color_eyre::Result<Node> {
    let blob_store = Arc::new(MemoryBlobStore::new());
    let meta_store: Arc<dyn store_iface::MetaStore> = Arc::new(MemoryMetaStore::new());

    let fetcher: Arc<dyn store_iface::SubtreeFetcher> =
        Arc::new(SubtreeFetchService::new(blob_store, None, &config.validator));

    let (processor, intake, notifications) =
        subtree_assembler::spawn(config.assembler, fetcher.clone(), meta_store.clone())
            .map_err(|error| color_eyre::eyre::eyre!("starting subtree processor: {error}"))?;

    let bloom_index = Arc::new(RwLock::new(BloomIndex::new(config.validator.bloom_filter_recent_blocks)));
    let validator = Arc::new(Validator::new(fetcher, meta_store.clone(), bloom_index, config.validator));

    let mined_status = MinedStatusUpdater::new(meta_store, config.mined_status);

    Ok(Node { processor, intake, notifications, validator, mined_status })
}
