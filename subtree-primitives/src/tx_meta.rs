//! Per-transaction metadata as held by the external UTXO/meta store (§3
//! TxMeta, §6).

use crate::hash::Hash;

/// The synthetic block id used for transactions imported during a restore
/// from a trusted snapshot rather than learned from the live chain.
///
/// `block_ids[0] == GENESIS_BLOCK_ID` means "trusted": §4.6 check 11
/// accepts a parent whose only block membership is this value without
/// requiring it to be on the current chain.
pub const GENESIS_BLOCK_ID: u32 = 0;

/// Metadata the external meta store holds for one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxMeta {
    pub fee: u64,
    pub size: u64,
    pub parent_tx_hashes: Vec<Hash>,
    pub lock_time: u32,
    pub is_coinbase: bool,
    /// Every block, on any chain, that has ever included this transaction.
    pub block_ids: Vec<u32>,
}

impl TxMeta {
    pub fn new(fee: u64, size: u64, parent_tx_hashes: Vec<Hash>, lock_time: u32, is_coinbase: bool) -> Self {
        TxMeta { fee, size, parent_tx_hashes, lock_time, is_coinbase, block_ids: Vec::new() }
    }

    /// Whether this transaction was imported from a trusted restore rather
    /// than mined on a chain we validated ourselves.
    pub fn is_trusted_import(&self) -> bool {
        matches!(self.block_ids.first(), Some(&GENESIS_BLOCK_ID))
    }

    /// Whether this transaction has been recorded as mined in any block of
    /// `chain_ids`, or is a trusted import.
    pub fn mined_on(&self, chain_ids: &std::collections::HashSet<u32>) -> bool {
        self.is_trusted_import() || self.block_ids.iter().any(|id| chain_ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn trusted_import_detected_by_leading_genesis_id() {
        let mut meta = TxMeta::new(0, 0, vec![], 0, false);
        meta.block_ids = vec![GENESIS_BLOCK_ID];
        assert!(meta.is_trusted_import());
        assert!(meta.mined_on(&HashSet::new()));
    }

    #[test]
    fn mined_on_checks_intersection() {
        let mut meta = TxMeta::new(0, 0, vec![], 0, false);
        meta.block_ids = vec![5, 6];
        let mut chain = HashSet::new();
        chain.insert(6);
        assert!(meta.mined_on(&chain));

        let mut other_chain = HashSet::new();
        other_chain.insert(7);
        assert!(!meta.mined_on(&other_chain));
    }
}
