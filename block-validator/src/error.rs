//! The consensus-rule error taxonomy (§4.6, §7, §8). Distinct from
//! [`subtree_primitives::BlockError`], which covers malformed bytes rather
//! than rule violations.

use subtree_primitives::Hash;

/// A reason a candidate [`subtree_primitives::Block`] fails one of the
/// eleven (plus stubbed twelfth) consensus checks of §4.6.
///
/// Variants are ordered to roughly match the check order; `Validator::
/// validate` returns the first one triggered (§4.6 "early-exit on the
/// first failure").
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum BlockValidationError {
    /// block hash does not meet the target expanded from its `bits` field
    InsufficientWork,
    /// block timestamp {0} is more than two hours ahead of local time {1}
    TimeTooNew(u32, u32),
    /// block is missing a valid coinbase transaction
    MissingCoinbase,
    /// coinbase does not embed the expected BIP-34 height (want {expected}, got {got:?})
    Bip34HeightMismatch { expected: u32, got: Option<u32> },
    /// subtrees have inconsistent leaf capacity
    InconsistentSubtreeCapacity,
    /// merkle root computed from subtree roots does not match the header
    MerkleRootMismatch,
    /// coinbase output total {claimed} is greater than fees + subsidy {allowed}
    CoinbaseOverClaim { claimed: u64, allowed: u64 },
    /// duplicate transaction {0}
    DuplicateTransaction(Hash),
    /// transaction {child} comes before its parent {parent}
    ComesBeforeParent { child: Hash, parent: Hash },
    /// transaction {0} has a lock time that has not yet matured
    ImmatureLockTime(Hash),
    /// transaction {tx} spends parent {parent}, which is not mined on this chain
    ParentNotMined { tx: Hash, parent: Hash },
    /// transaction {0} is already mined on this chain (detected via Bloom cross-check)
    AlreadyMined(Hash),
    /// a required subtree or transaction meta lookup failed: {0}
    Storage(#[from] store_iface::StoreError),
    /// validation was cancelled
    Cancelled,
}

impl BlockValidationError {
    /// The coarse [`store_iface::ErrorKind`] this error maps to, so callers
    /// outside this crate can branch on retry/propagation behaviour
    /// uniformly (§7).
    pub fn kind(&self) -> store_iface::ErrorKind {
        use store_iface::ErrorKind;
        match self {
            BlockValidationError::Storage(inner) => inner.kind,
            BlockValidationError::Cancelled => ErrorKind::ContextCancelled,
            BlockValidationError::DuplicateTransaction(_)
            | BlockValidationError::ComesBeforeParent { .. }
            | BlockValidationError::ParentNotMined { .. }
            | BlockValidationError::AlreadyMined(_)
            | BlockValidationError::InsufficientWork
            | BlockValidationError::TimeTooNew(..)
            | BlockValidationError::MissingCoinbase
            | BlockValidationError::Bip34HeightMismatch { .. }
            | BlockValidationError::InconsistentSubtreeCapacity
            | BlockValidationError::MerkleRootMismatch
            | BlockValidationError::CoinbaseOverClaim { .. } => ErrorKind::BlockInvalid,
            BlockValidationError::ImmatureLockTime(_) => ErrorKind::LockTime,
        }
    }
}
