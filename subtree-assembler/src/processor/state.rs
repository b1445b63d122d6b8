//! The mutable state owned exclusively by C3's owner task (§4.3).
//!
//! Every method here takes `&mut self` and is only ever called from inside
//! the single task that owns a [`ProcessorState`] — see `processor::run` for
//! the `select` loop that enforces this.

use std::{collections::HashSet, sync::Arc};

use store_iface::{MetaStore, SubtreeFetcher};
use subtree_primitives::{Block, Hash, Subtree, SubtreeError, SubtreeNode, TxMeta};
use tokio::sync::mpsc;

use crate::{processor::error::ProcessorError, queue::IntakeReceiver, remove_map::RemoveMap};

pub struct ProcessorState {
    chained_subtrees: Vec<Subtree>,
    open_subtree: Subtree,
    capacity: u64,
    /// The hash of the block we're currently built on top of. `None` before
    /// the first `move_up`.
    ///
    /// Tracked as a bare hash rather than a full `BlockHeader`: the
    /// processor has no header store of its own (that's out of scope, §1),
    /// so `move_down` can only recover `block.header.prev_hash`, not the
    /// parent's full header.
    current_tip_hash: Option<Hash>,
}

impl ProcessorState {
    pub fn new(capacity: u64) -> Result<Self, SubtreeError> {
        let mut open_subtree = Subtree::new(capacity)?;
        open_subtree.add_coinbase_placeholder()?;
        Ok(ProcessorState { chained_subtrees: Vec::new(), open_subtree, capacity, current_tip_hash: None })
    }

    pub fn current_tip_hash(&self) -> Option<Hash> {
        self.current_tip_hash
    }

    pub fn chained_subtrees(&self) -> &[Subtree] {
        &self.chained_subtrees
    }

    pub fn open_subtree(&self) -> &Subtree {
        &self.open_subtree
    }

    fn reset_with_placeholder(&mut self) {
        let mut open_subtree = Subtree::new(self.capacity).expect("capacity validated at construction");
        open_subtree
            .add_coinbase_placeholder()
            .expect("a freshly-opened subtree always has room for one node");
        self.chained_subtrees.clear();
        self.open_subtree = open_subtree;
    }

    /// Appends `node` to the open subtree; on completion, seals it onto
    /// `chained_subtrees` and opens a fresh one at the same capacity (§4.3
    /// `add_node`).
    ///
    /// A full open subtree is logged and the node dropped rather than
    /// propagated: per §4.3 Failure semantics, this never corrupts
    /// in-flight state, because the open subtree is replaced only after a
    /// successful append.
    pub fn add_node(&mut self, node: SubtreeNode, notify: bool, notify_tx: &mpsc::UnboundedSender<Subtree>) {
        if let Err(error) = self.open_subtree.add_node(node) {
            tracing::warn!(%error, hash = %node.hash, "dropping node that the open subtree rejected");
            return;
        }

        if self.open_subtree.is_complete() {
            let mut fresh = Subtree::new(self.capacity).expect("capacity validated at construction");
            std::mem::swap(&mut self.open_subtree, &mut fresh);
            let sealed = fresh;
            if notify {
                if notify_tx.send(sealed.clone()).is_err() {
                    tracing::warn!("no receiver for completed subtree notifications");
                }
            }
            self.chained_subtrees.push(sealed);
        }
    }

    /// `get_current_subtrees`: chained complete subtrees, plus (only when
    /// none are complete yet and the open one holds more than the coinbase
    /// placeholder) a synthetic incomplete subtree, materialised and
    /// published on the notification channel (§4.3).
    pub fn snapshot(&self, notify_tx: &mpsc::UnboundedSender<Subtree>) -> Vec<Subtree> {
        let mut snapshot = self.chained_subtrees.clone();
        if self.chained_subtrees.is_empty() && self.open_subtree.len() > 1 {
            let synthetic = self.open_subtree.clone();
            if notify_tx.send(synthetic.clone()).is_err() {
                tracing::warn!("no receiver for completed subtree notifications");
            }
            snapshot.push(synthetic);
        }
        snapshot
    }

    /// `move_up(block)` (§4.3): advance one block on the current chain.
    ///
    /// `notify` is `false` for every `move_up` but the last in a `reorg`
    /// sequence (§4.3 `reorg`).
    #[allow(clippy::too_many_arguments)]
    pub async fn move_up(
        &mut self,
        block: &Block,
        fetcher: &Arc<dyn SubtreeFetcher>,
        meta_store: &Arc<dyn MetaStore>,
        queue: &mut IntakeReceiver,
        remove_map: &RemoveMap,
        notify: bool,
        notify_tx: &mpsc::UnboundedSender<Subtree>,
    ) -> Result<(), ProcessorError> {
        // 1. Coinbase UTXOs become spendable 100 blocks from now.
        let coinbase_id = block.coinbase_tx.id();
        let coinbase_meta = TxMeta::new(0, 0, Vec::new(), block.coinbase_tx.lock_time, true);
        meta_store
            .store(coinbase_id, coinbase_meta, block.height + 100)
            .await
            .map_err(|source| ProcessorError::Fetch(coinbase_id, source))?;

        // 2. The set of subtrees this block commits to.
        let mut block_subtree_set: HashSet<Hash> = block.subtree_roots.iter().copied().collect();

        // 3. Partition: subtrees we had that the block also references were
        // mined out from under us; the rest carries forward.
        let mined_out = std::mem::take(&mut self.chained_subtrees);
        let mut our_leftover = Vec::with_capacity(mined_out.len());
        for subtree in mined_out {
            if !block_subtree_set.remove(&subtree.root_hash()) {
                our_leftover.push(subtree);
            }
        }

        // 4/5. `tx_map` is the set of hashes already accounted for by the
        // block's own subtrees, other than ones we ourselves contributed;
        // empty when we mined the block (nothing outside our own leftover
        // needs filtering out of the refill).
        let mut tx_map = HashSet::new();
        let carry_forward: Vec<SubtreeNode> = if block_subtree_set.is_empty() {
            // We mined this block ourselves: every leftover node (minus the
            // coinbase placeholder, and minus the new coinbase itself per
            // spec.md's Open Question on this guard) carries forward
            // untouched.
            let mut nodes = Vec::new();
            for subtree in &our_leftover {
                nodes.extend(subtree.nodes().iter().copied());
            }
            nodes.extend(self.open_subtree.nodes().iter().copied());
            nodes.retain(|n| !n.is_coinbase_placeholder() && n.hash != coinbase_id && !remove_map.take(&n.hash));
            nodes
        } else {
            // Someone else's subtrees also landed in this block: fetch
            // them, build the set of hashes they already contain, and keep
            // only what isn't in that set (and isn't scheduled for removal).
            for root in &block_subtree_set {
                let subtree = fetcher
                    .fetch(*root, self.capacity)
                    .await
                    .map_err(|source| ProcessorError::Fetch(*root, source))?;
                tx_map.extend(subtree.nodes().iter().map(|n| n.hash));
            }

            let mut nodes = Vec::new();
            for subtree in &our_leftover {
                nodes.extend(subtree.difference(&tx_map).into_iter().copied());
            }
            nodes.extend(self.open_subtree.difference(&tx_map).into_iter().copied());
            nodes.retain(|n| !n.is_coinbase_placeholder() && n.hash != coinbase_id && !remove_map.take(&n.hash));
            nodes
        };

        self.reset_with_placeholder();
        for node in carry_forward {
            self.add_node(node, notify, notify_tx);
        }

        // 6. Re-drain the queue: anything that arrived mid-move is subject
        // to the same remove-map check as the default loop, and must also
        // be filtered against `tx_map` — a transaction that arrived while
        // we were awaiting the fetch above may already be mined into one
        // of the subtrees we just fetched.
        let valid_from = crate::queue::now_millis();
        while let Some(node) = queue.dequeue(valid_from) {
            if remove_map.take(&node.hash) || tx_map.contains(&node.hash) {
                continue;
            }
            self.add_node(node, notify, notify_tx);
        }

        // 7. Advance the tip.
        self.current_tip_hash = Some(block.header.hash());
        Ok(())
    }

    /// `move_down(block)` (§4.3): undo one block, rebuilding processor
    /// state from the block's own subtrees plus whatever we already had
    /// pending.
    pub async fn move_down(
        &mut self,
        block: &Block,
        fetcher: &Arc<dyn SubtreeFetcher>,
        meta_store: &Arc<dyn MetaStore>,
        notify_tx: &mpsc::UnboundedSender<Subtree>,
    ) -> Result<(), ProcessorError> {
        // 1. Revert the coinbase.
        let coinbase_id = block.coinbase_tx.id();
        meta_store
            .delete(coinbase_id)
            .await
            .map_err(|source| ProcessorError::Fetch(coinbase_id, source))?;

        // 2. Save what we already had pending.
        let mut pre_existing = Vec::new();
        for subtree in &self.chained_subtrees {
            pre_existing.extend(subtree.nodes().iter().copied());
        }
        pre_existing.extend(
            self.open_subtree.nodes().iter().copied().filter(|n| !n.is_coinbase_placeholder()),
        );

        // 3. Fresh open subtree, coinbase placeholder restored.
        self.reset_with_placeholder();

        // 4. Fetch every subtree the undone block referenced (in parallel),
        // then insert their nodes in order, skipping the coinbase
        // placeholder at subtree 0 position 0.
        let fetches = block.subtree_roots.iter().map(|root| fetcher.fetch(*root, self.capacity));
        let fetched = futures::future::try_join_all(fetches)
            .await
            .map_err(|source| ProcessorError::Fetch(block.header.hash(), source))?;

        for (subtree_index, subtree) in fetched.iter().enumerate() {
            for (node_index, node) in subtree.nodes().iter().enumerate() {
                if subtree_index == 0 && node_index == 0 {
                    continue;
                }
                self.add_node(*node, false, notify_tx);
            }
        }

        // 5. Re-add whatever was already pending before the rollback.
        for node in pre_existing {
            self.add_node(node, false, notify_tx);
        }

        // 6. The tip moves to the undone block's parent.
        self.current_tip_hash = Some(block.header.prev_hash);
        Ok(())
    }

    /// `reorg(down, up)` (§4.3): undo `down` in order, then apply `up` in
    /// order, suppressing per-subtree notifications for every `up` but the
    /// last.
    #[allow(clippy::too_many_arguments)]
    pub async fn reorg(
        &mut self,
        down: &[Block],
        up: &[Block],
        fetcher: &Arc<dyn SubtreeFetcher>,
        meta_store: &Arc<dyn MetaStore>,
        queue: &mut IntakeReceiver,
        remove_map: &RemoveMap,
        notify_tx: &mpsc::UnboundedSender<Subtree>,
    ) -> Result<(), ProcessorError> {
        for block in down {
            self.move_down(block, fetcher, meta_store, notify_tx).await?;
        }

        let last = up.len().saturating_sub(1);
        for (index, block) in up.iter().enumerate() {
            let notify = index == last;
            self.move_up(block, fetcher, meta_store, queue, remove_map, notify, notify_tx).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;
    use std::sync::Arc;
    use store_iface::testing::{MemoryMetaStore, NullSubtreeFetcher};

    fn node(byte: u8) -> SubtreeNode {
        SubtreeNode::new(Hash([byte; 32]), 10, 250)
    }

    #[tokio::test]
    async fn add_node_seals_and_reopens_on_completion() {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let mut state = ProcessorState::new(2).unwrap();

        // position 0 is the coinbase placeholder; one more node fills it.
        state.add_node(node(1), true, &notify_tx);
        assert_eq!(state.chained_subtrees().len(), 1);
        assert_eq!(state.open_subtree().len(), 0);
        assert!(notify_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn snapshot_materialises_synthetic_subtree_when_nothing_is_complete() {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let mut state = ProcessorState::new(4).unwrap();
        state.add_node(node(1), false, &notify_tx);

        let snapshot = state.snapshot(&notify_tx);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].len(), 2);
        assert!(notify_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn move_up_advances_tip_and_empties_mined_subtree() {
        let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
        let (_tx, mut queue) = queue::channel();
        let remove_map = RemoveMap::new();
        let fetcher: Arc<dyn SubtreeFetcher> = Arc::new(NullSubtreeFetcher);
        let meta_store: Arc<dyn MetaStore> = Arc::new(MemoryMetaStore::new());

        let mut state = ProcessorState::new(2).unwrap();
        state.add_node(node(1), false, &notify_tx);
        let sealed_root = state.chained_subtrees()[0].root_hash();

        let block = crate::test_support::block_referencing(vec![sealed_root], 1);

        state
            .move_up(&block, &fetcher, &meta_store, &mut queue, &remove_map, true, &notify_tx)
            .await
            .unwrap();

        assert_eq!(state.current_tip_hash(), Some(block.header.hash()));
        assert!(state.chained_subtrees().is_empty());
    }
}
