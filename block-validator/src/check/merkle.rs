//! §4.6 check 8 (with the coinbase-placeholder substitution of check 7
//! folded in, per §4.4): delegates to [`subtree_primitives::Block::
//! check_merkle_root`], which already implements the substitution and
//! balanced-tree construction over subtree roots.

use subtree_primitives::Block;

use crate::error::BlockValidationError;

pub fn check_merkle_root(block: &Block) -> Result<(), BlockValidationError> {
    block.check_merkle_root().map_err(|_| BlockValidationError::MerkleRootMismatch)
}
