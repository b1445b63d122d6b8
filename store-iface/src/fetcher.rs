//! The capability boundary consumed by callers that need a subtree (or its
//! meta sidecar) by hash, independent of how retries/fallback are
//! implemented (that's C5, in `block-validator::fetch`).
//!
//! Both the subtree processor's reorg path (C3) and the block validator
//! (C6) depend on this trait rather than on each other, so a concrete
//! fetcher can be constructed once (by the node binary) and shared.

use async_trait::async_trait;
use subtree_primitives::{Hash, Subtree, SubtreeMeta};

use crate::error::StoreError;

#[async_trait]
pub trait SubtreeFetcher: Send + Sync {
    /// Fetches and deserializes the subtree named by `hash`, which must
    /// have been written with the given `leaf_capacity`.
    async fn fetch(&self, hash: Hash, leaf_capacity: u64) -> Result<Subtree, StoreError>;

    /// Fetches the optional `.meta` sidecar for `hash`. Absence is not an
    /// error — callers degrade to per-node meta-store lookups (§4.5, §4.6
    /// check 11).
    async fn fetch_meta(&self, hash: Hash) -> Result<Option<SubtreeMeta>, StoreError>;
}
