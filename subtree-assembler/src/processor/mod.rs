//! C3: the subtree processor — a single owner task that mutates the
//! processor's subtree chain, reached only through [`ProcessorHandle`]
//! (§4.3, §5).

mod error;
mod request;
mod state;

use std::{sync::Arc, time::Duration};

use store_iface::{MetaStore, SubtreeFetcher};
use subtree_primitives::{Block, Hash, Subtree, SubtreeError};
use tokio::sync::{mpsc, oneshot};

pub use error::ProcessorError;

use crate::{
    config::Config,
    queue::{self, IntakeReceiver, IntakeSender},
    remove_map::RemoveMap,
};
use request::Request;
use state::ProcessorState;

/// A cloneable handle to the owner task. Every method sends a request over
/// a channel and awaits the task's reply — no lock is ever taken on
/// processor state from outside the owner task (§5).
#[derive(Clone)]
pub struct ProcessorHandle {
    requests: mpsc::UnboundedSender<Request>,
    remove_map: Arc<RemoveMap>,
}

impl ProcessorHandle {
    /// `get_current_subtrees` (§4.3).
    pub async fn get_current_subtrees(&self) -> Result<Vec<Subtree>, ProcessorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::GetCurrentSubtrees(reply_tx))
            .map_err(|_| ProcessorError::Gone)?;
        reply_rx.await.map_err(|_| ProcessorError::Gone)
    }

    /// `move_up(block)` (§4.3).
    pub async fn move_up(&self, block: Block) -> Result<(), ProcessorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::MoveUp(Box::new(block), reply_tx))
            .map_err(|_| ProcessorError::Gone)?;
        reply_rx.await.map_err(|_| ProcessorError::Gone)?
    }

    /// `move_down(block)` (§4.3).
    pub async fn move_down(&self, block: Block) -> Result<(), ProcessorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::MoveDown(Box::new(block), reply_tx))
            .map_err(|_| ProcessorError::Gone)?;
        reply_rx.await.map_err(|_| ProcessorError::Gone)?
    }

    /// `reorg(down, up)` (§4.3).
    pub async fn reorg(&self, down: Vec<Block>, up: Vec<Block>) -> Result<(), ProcessorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::Reorg(down, up, reply_tx))
            .map_err(|_| ProcessorError::Gone)?;
        reply_rx.await.map_err(|_| ProcessorError::Gone)?
    }

    /// Schedules `hash` for suppression the next time it surfaces from the
    /// intake queue (§3 Remove-map). Does not itself touch processor
    /// state — the owner task consults the remove-map on its own schedule.
    pub fn remove(&self, hash: Hash) {
        self.remove_map.insert(hash);
    }
}

/// Starts the owner task and returns a handle to it, the producer side of
/// the intake queue, and a receiver for completed-subtree notifications.
pub fn spawn(
    config: Config,
    fetcher: Arc<dyn SubtreeFetcher>,
    meta_store: Arc<dyn MetaStore>,
) -> Result<(ProcessorHandle, IntakeSender, mpsc::UnboundedReceiver<Subtree>), SubtreeError> {
    let state = ProcessorState::new(config.initial_merkle_items_per_subtree)?;
    let (intake_tx, intake_rx) = queue::channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let remove_map = Arc::new(RemoveMap::new());

    tokio::spawn(run(state, config, fetcher, meta_store, intake_rx, request_rx, remove_map.clone(), notify_tx));

    Ok((ProcessorHandle { requests: request_tx, remove_map }, intake_tx, notify_rx))
}

/// The owner task's `select` loop (§4.3): requests are served with
/// priority; whenever none is immediately ready, the default branch drains
/// up to `batcher_size` eligible nodes from the intake queue, sleeping 1 ms
/// if it drained nothing.
async fn run(
    mut state: ProcessorState,
    config: Config,
    fetcher: Arc<dyn SubtreeFetcher>,
    meta_store: Arc<dyn MetaStore>,
    mut intake_rx: IntakeReceiver,
    mut request_rx: mpsc::UnboundedReceiver<Request>,
    remove_map: Arc<RemoveMap>,
    notify_tx: mpsc::UnboundedSender<Subtree>,
) {
    loop {
        tokio::select! {
            biased;

            maybe_request = request_rx.recv() => {
                let Some(request) = maybe_request else {
                    tracing::info!("all processor handles dropped, shutting down owner task");
                    return;
                };
                handle_request(&mut state, &fetcher, &meta_store, &mut intake_rx, &remove_map, &notify_tx, request).await;
            }

            _ = std::future::ready(()) => {
                let drained = drain_once(&mut state, &config, &mut intake_rx, &remove_map, &notify_tx);
                if drained == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
    }
}

async fn handle_request(
    state: &mut ProcessorState,
    fetcher: &Arc<dyn SubtreeFetcher>,
    meta_store: &Arc<dyn MetaStore>,
    intake_rx: &mut IntakeReceiver,
    remove_map: &Arc<RemoveMap>,
    notify_tx: &mpsc::UnboundedSender<Subtree>,
    request: Request,
) {
    match request {
        Request::GetCurrentSubtrees(reply) => {
            let _ = reply.send(state.snapshot(notify_tx));
        }
        Request::MoveUp(block, reply) => {
            let result = state.move_up(&block, fetcher, meta_store, intake_rx, remove_map, true, notify_tx).await;
            if let Err(ref error) = result {
                tracing::error!(%error, "move_up failed; node should restart to reconcile (§4.3)");
            }
            let _ = reply.send(result);
        }
        Request::MoveDown(block, reply) => {
            let result = state.move_down(&block, fetcher, meta_store, notify_tx).await;
            if let Err(ref error) = result {
                tracing::error!(%error, "move_down failed; node should restart to reconcile (§4.3)");
            }
            let _ = reply.send(result);
        }
        Request::Reorg(down, up, reply) => {
            let result =
                state.reorg(&down, &up, fetcher, meta_store, intake_rx, remove_map, notify_tx).await;
            if let Err(ref error) = result {
                tracing::error!(%error, "reorg failed; node should restart to reconcile (§4.3)");
            }
            let _ = reply.send(result);
        }
    }
}

/// Drains up to `config.batcher_size` eligible nodes, filtering each
/// through the remove-map first (§4.3 default loop iteration). Returns how
/// many were actually appended.
fn drain_once(
    state: &mut ProcessorState,
    config: &Config,
    intake_rx: &mut IntakeReceiver,
    remove_map: &RemoveMap,
    notify_tx: &mpsc::UnboundedSender<Subtree>,
) -> usize {
    let valid_from = queue::now_millis().saturating_sub(config.double_spend_window_millis);
    let mut drained = 0;
    for _ in 0..config.batcher_size {
        let Some(node) = intake_rx.dequeue(valid_from) else { break };
        if remove_map.take(&node.hash) {
            continue;
        }
        state.add_node(node, true, notify_tx);
        drained += 1;
    }
    drained
}
