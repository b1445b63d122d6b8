//! §4.6 check 9: the coinbase may not claim more than the protocol subsidy
//! plus the fees actually collected by the block's subtrees.

use subtree_primitives::{work::block_subsidy, Block};

use crate::error::BlockValidationError;

/// Requires `block.subtree_slices` to already be populated (by check 6).
pub fn check_reward(block: &Block) -> Result<(), BlockValidationError> {
    let fees: u64 = block.subtree_slices.iter().map(|s| s.fees()).sum();
    let allowed = block_subsidy(block.height) + fees;
    let claimed = block.coinbase_tx.output_value();

    if claimed <= allowed {
        Ok(())
    } else {
        Err(BlockValidationError::CoinbaseOverClaim { claimed, allowed })
    }
}
