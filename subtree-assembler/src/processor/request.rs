//! The request/reply protocol spoken to the owner task (§4.3).

use subtree_primitives::{Block, Subtree};
use tokio::sync::oneshot;

use crate::processor::ProcessorError;

/// A snapshot of the chained complete subtrees, plus (if the open subtree
/// holds anything beyond the coinbase) a synthetic trailing incomplete one.
pub type SubtreeSnapshot = Vec<Subtree>;

/// Requests accepted by the owner task's `select` loop. Each variant carries
/// its own reply channel; the caller-facing [`super::ProcessorHandle`] hides
/// this behind ordinary async methods.
pub enum Request {
    GetCurrentSubtrees(oneshot::Sender<SubtreeSnapshot>),
    MoveUp(Box<Block>, oneshot::Sender<Result<(), ProcessorError>>),
    MoveDown(Box<Block>, oneshot::Sender<Result<(), ProcessorError>>),
    Reorg(Vec<Block>, Vec<Block>, oneshot::Sender<Result<(), ProcessorError>>),
}
