//! §4.6 check 1: the header hash must satisfy the target expanded from its
//! `bits` field. Difficulty retargeting itself is a Non-goal (§1) — this
//! only compares against whatever target the header already claims.

use subtree_primitives::{work::hash_meets_target, BlockHeader};

use crate::error::BlockValidationError;

pub fn check_proof_of_work(header: &BlockHeader) -> Result<(), BlockValidationError> {
    if hash_meets_target(&header.hash(), header.bits) {
        Ok(())
    } else {
        Err(BlockValidationError::InsufficientWork)
    }
}
