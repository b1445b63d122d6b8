//! §4.6 check 5: past the activation height, a version >= 2 block's
//! coinbase must embed the block's own height (BIP-34).

use subtree_primitives::{work::BIP34_ACTIVATION_HEIGHT, Block};

use crate::error::BlockValidationError;

pub fn check_bip34_height(block: &Block) -> Result<(), BlockValidationError> {
    if block.header.version < 2 || block.height <= BIP34_ACTIVATION_HEIGHT {
        return Ok(());
    }

    let got = block.coinbase_tx.extract_coinbase_height();
    if got == Some(block.height) {
        Ok(())
    } else {
        Err(BlockValidationError::Bip34HeightMismatch { expected: block.height, got })
    }
}
