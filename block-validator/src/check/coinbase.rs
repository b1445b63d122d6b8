//! §4.6 check 4: the block's first (and only recorded) transaction must be
//! a valid coinbase.

use subtree_primitives::Block;

use crate::error::BlockValidationError;

pub fn check_coinbase_present(block: &Block) -> Result<(), BlockValidationError> {
    if block.coinbase_tx.is_coinbase() {
        Ok(())
    } else {
        Err(BlockValidationError::MissingCoinbase)
    }
}
