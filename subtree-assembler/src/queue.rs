//! C2: the lock-free transaction intake queue and the double-spend window
//! it enforces (§4.2).

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use subtree_primitives::SubtreeNode;
use tokio::sync::mpsc;

/// A node paired with the wall-clock time (in milliseconds since the Unix
/// epoch) it was enqueued at.
#[derive(Clone, Copy, Debug)]
struct QueuedNode {
    node: SubtreeNode,
    enqueued_at_millis: u64,
}

/// Returns the current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as u64
}

/// The producer half of the intake queue. Cheaply cloneable; any number of
/// producers may enqueue concurrently (§4.2, §5 lock-free MPSC).
#[derive(Clone)]
pub struct IntakeSender {
    inner: mpsc::UnboundedSender<QueuedNode>,
    length: Arc<AtomicUsize>,
}

/// Error returned when the owning [`IntakeReceiver`] has been dropped.
#[derive(thiserror::Error, Debug)]
#[error("intake queue receiver has been dropped")]
pub struct QueueClosed;

impl IntakeSender {
    /// Enqueues `node`, stamping it with the current time.
    pub fn enqueue(&self, node: SubtreeNode) -> Result<(), QueueClosed> {
        self.inner
            .send(QueuedNode { node, enqueued_at_millis: now_millis() })
            .map_err(|_| QueueClosed)?;
        self.length.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// A lower bound on how many nodes are currently enqueued or held back
    /// by the double-spend window; used for backpressure visibility only
    /// (§4.2: "no size bound by design — producers must rate-limit
    /// upstream").
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Relaxed)
    }
}

/// The single-consumer half of the intake queue, owned by the subtree
/// processor's owner task (§4.3).
pub struct IntakeReceiver {
    inner: mpsc::UnboundedReceiver<QueuedNode>,
    /// Nodes pulled off the channel but not yet past the double-spend
    /// window, kept in arrival order.
    pending: VecDeque<QueuedNode>,
    length: Arc<AtomicUsize>,
}

/// Creates a fresh intake queue and returns its sender/receiver halves.
pub fn channel() -> (IntakeSender, IntakeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let length = Arc::new(AtomicUsize::new(0));
    (
        IntakeSender { inner: tx, length: length.clone() },
        IntakeReceiver { inner: rx, pending: VecDeque::new(), length },
    )
}

impl IntakeReceiver {
    /// Returns the oldest node enqueued no later than `valid_from_millis`,
    /// if one exists; otherwise `None` without disturbing ordering.
    ///
    /// A node enqueued `now` stays queued until `now + double_spend_window`
    /// has passed, enforcing §4.2's suppression window: `move_up`'s
    /// remove-map check happens *after* `dequeue` returns the node, so a
    /// `remove` that lands before this point still wins.
    pub fn dequeue(&mut self, valid_from_millis: u64) -> Option<SubtreeNode> {
        while let Ok(queued) = self.inner.try_recv() {
            self.pending.push_back(queued);
        }

        match self.pending.front() {
            Some(front) if front.enqueued_at_millis <= valid_from_millis => {
                let queued = self.pending.pop_front().expect("front() just confirmed Some");
                self.length.fetch_sub(1, Ordering::Relaxed);
                Some(queued.node)
            }
            _ => None,
        }
    }

    /// Current queue depth, including the held-back (not-yet-eligible)
    /// portion.
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtree_primitives::Hash;

    fn node(byte: u8) -> SubtreeNode {
        SubtreeNode::new(Hash([byte; 32]), 0, 0)
    }

    #[tokio::test]
    async fn dequeue_withholds_nodes_inside_the_window() {
        let (tx, mut rx) = channel();
        tx.enqueue(node(1)).unwrap();

        // valid_from in the past: the node was enqueued "now", so it isn't
        // eligible yet.
        assert!(rx.dequeue(0).is_none());
        assert_eq!(rx.length(), 1);
    }

    #[tokio::test]
    async fn dequeue_releases_nodes_past_the_window() {
        let (tx, mut rx) = channel();
        tx.enqueue(node(1)).unwrap();

        let far_future = now_millis() + 10_000;
        let dequeued = rx.dequeue(far_future);
        assert_eq!(dequeued.unwrap().hash, Hash([1u8; 32]));
        assert_eq!(rx.length(), 0);
    }

    #[tokio::test]
    async fn dequeue_preserves_fifo_order() {
        let (tx, mut rx) = channel();
        tx.enqueue(node(1)).unwrap();
        tx.enqueue(node(2)).unwrap();

        let far_future = now_millis() + 10_000;
        assert_eq!(rx.dequeue(far_future).unwrap().hash, Hash([1u8; 32]));
        assert_eq!(rx.dequeue(far_future).unwrap().hash, Hash([2u8; 32]));
    }

    #[tokio::test]
    async fn length_tracks_enqueue_and_dequeue() {
        let (tx, mut rx) = channel();
        assert_eq!(tx.length(), 0);
        tx.enqueue(node(1)).unwrap();
        assert_eq!(tx.length(), 1);

        let far_future = now_millis() + 10_000;
        rx.dequeue(far_future);
        assert_eq!(rx.length(), 0);
    }
}
