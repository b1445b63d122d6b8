//! Minimal block construction for the processor's own unit tests. Not a
//! miner: just enough of a [`Block`] to exercise `move_up`/`move_down`.
#![cfg(test)]

use subtree_primitives::{transaction::TxOutput, Block, BlockHeader, Hash, Transaction};

pub fn block_referencing(subtree_roots: Vec<Hash>, height: u32) -> Block {
    let coinbase = Transaction::new_coinbase(1, height, vec![TxOutput { value: 0, script_pubkey: vec![] }]);
    let header = BlockHeader {
        version: 1,
        prev_hash: Hash([9u8; 32]),
        merkle_root: Hash::ZERO,
        timestamp: 0,
        bits: 0,
        nonce: 0,
    };
    Block {
        header,
        coinbase_tx: coinbase,
        tx_count: 0,
        size_bytes: 0,
        subtree_roots,
        height,
        id: height,
        subtree_slices: Vec::new(),
    }
}
