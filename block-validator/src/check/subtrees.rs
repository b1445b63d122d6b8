//! §4.6 check 6: fetches every subtree a candidate block references,
//! populating `Block::subtree_slices`, and checks that all subtrees but
//! possibly the last share one leaf capacity.

use futures::stream::{self, StreamExt};
use store_iface::SubtreeFetcher;
use subtree_primitives::Block;

use crate::error::BlockValidationError;

/// Fetches `block`'s subtrees in parallel (bounded by `concurrency`,
/// §4.6 "parallel fetch ... up to min(num_cpus, configured_limit)"),
/// preserving the original order of `subtree_roots` in `subtree_slices`.
pub async fn fetch_and_validate_subtrees(
    block: &mut Block,
    fetcher: &dyn SubtreeFetcher,
    leaf_capacity: u64,
    concurrency: usize,
) -> Result<(), BlockValidationError> {
    let roots = block.subtree_roots.clone();
    let slices: Vec<_> = stream::iter(roots)
        .map(|hash| async move { fetcher.fetch(hash, leaf_capacity).await })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    block.subtree_slices = slices;

    if block.subtree_capacities_consistent() {
        Ok(())
    } else {
        Err(BlockValidationError::InconsistentSubtreeCapacity)
    }
}
