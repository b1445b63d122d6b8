//! The external UTXO/meta store: key-value lookup keyed by transaction
//! hash (§1, §6).

use async_trait::async_trait;
use subtree_primitives::{Hash, TxMeta};

use crate::error::StoreError;

/// The capability set consumed from the UTXO/meta store.
///
/// All calls are idempotent by `(hash, block_id)`: retrying `set_mined_multi`
/// or `store` for the same pair after a partial failure is always safe.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn get_meta(&self, hash: Hash) -> Result<TxMeta, StoreError>;

    /// Fills in the requested `fields` for every hash in `missing`, batched
    /// in a single round trip where the backend supports it.
    async fn batch_decorate(
        &self,
        missing: &[Hash],
        fields: &[&str],
    ) -> Result<Vec<(Hash, TxMeta)>, StoreError>;

    async fn set_mined_multi(&self, hashes: &[Hash], block_id: u32) -> Result<(), StoreError>;

    /// Reverts a transaction's record, used when undoing a block (§4.3
    /// `move_down`).
    async fn delete(&self, hash: Hash) -> Result<(), StoreError>;

    /// Records a newly-seen transaction (e.g. a coinbase) as spendable
    /// starting at `spendable_height`.
    async fn store(&self, hash: Hash, meta: TxMeta, spendable_height: u32) -> Result<(), StoreError>;
}
