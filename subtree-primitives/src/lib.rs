//! Shared data model for the subtree-based block assembly and validation
//! node: hashes, subtrees, transactions, block headers, merkle helpers and
//! the fixed proof-of-work/subsidy schedule.
//!
//! This crate carries no I/O and no async runtime — it is the "what the
//! bytes mean" layer shared by the assembler (`subtree-assembler`) and the
//! validator (`block-validator`).

pub mod block;
pub mod block_header;
pub mod hash;
pub mod merkle;
pub mod serialization;
pub mod subtree;
pub mod transaction;
pub mod tx_meta;
pub mod work;

pub use block::{Block, BlockError};
pub use block_header::BlockHeader;
pub use hash::Hash;
pub use subtree::{Subtree, SubtreeError, SubtreeMeta, SubtreeNode};
pub use transaction::Transaction;
pub use tx_meta::{TxMeta, GENESIS_BLOCK_ID};
