//! Configuration recognised by the assembler (§6).

use std::time::Duration;

/// Configuration for the intake queue and subtree processor.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// The leaf capacity new subtrees are opened with. Grows as the
    /// mempool grows in a real deployment; fixed here, per node, for a
    /// given run.
    pub initial_merkle_items_per_subtree: u64,

    /// The intake channel's logical buffer size, used only for backpressure
    /// metrics — the channel itself is unbounded by design (§4.2).
    pub tx_chan_buffer_size: usize,

    /// How many nodes the owner loop drains from the intake queue per
    /// iteration (§4.3 default loop step 2).
    pub batcher_size: usize,

    /// The double-spend window (§3, §4.2): the delay between a
    /// transaction's enqueue time and its eligibility to enter a subtree.
    pub double_spend_window_millis: u64,
}

impl Config {
    pub fn double_spend_window(&self) -> Duration {
        Duration::from_millis(self.double_spend_window_millis)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_merkle_items_per_subtree: 1_048_576,
            tx_chan_buffer_size: 100_000,
            batcher_size: 1_000,
            double_spend_window_millis: 2_000,
        }
    }
}
