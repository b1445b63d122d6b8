//! §4.6 check 12 (stubbed, per §9 Open Question): each subtree's
//! `conflicting_nodes` is collected and exposed for future enforcement, but
//! never asserted against. The invariant this would eventually enforce is
//! "no double-spend confirmed on this chain", compared via `block_ids`
//! sets — left unimplemented here, matching the source it's grounded on.

use subtree_primitives::{Block, Hash};

/// One subtree's collected conflicting-node set, reported but not acted on.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct ConflictReport {
    pub conflicting: Vec<Hash>,
}

/// Gathers every subtree's `conflicting_nodes` (§3 Subtree invariants) into
/// one report. Always succeeds: the presence of conflicting nodes does not
/// invalidate a block (§9 "treat this as a placeholder ... do not
/// invalidate blocks on their presence").
pub fn check_conflicting_transactions(block: &Block) -> ConflictReport {
    let conflicting = block
        .subtree_slices
        .iter()
        .flat_map(|subtree| subtree.conflicting_nodes().iter().copied())
        .collect();
    ConflictReport { conflicting }
}
