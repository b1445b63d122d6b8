//! Configuration recognised by the mined-status updater and tx-meta cache
//! (§6).

use std::time::Duration;

/// Configuration for C7's updater and C9's cache.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many `mark_mined` calls a single caller (e.g. the validator
    /// confirming a whole block) may have in flight at once.
    pub max_mined_routines: usize,

    /// How many per-node "mark mined" requests the batch worker
    /// accumulates before flushing one `set_mined_multi` call.
    pub max_mined_batch: usize,

    /// How long the first request in a batch waits for more to join it
    /// before the worker flushes anyway.
    pub max_mined_batch_latency_millis: u64,

    /// How many times a failed `set_mined_multi` call is retried before
    /// the caller observes the error, with backoff `1 + 2 * retry` seconds.
    pub max_retries: u32,

    /// Number of independently-locked shards in the tx-meta cache.
    pub tx_meta_cache_shards: usize,

    /// Maximum number of entries held per shard before the least recently
    /// used one is evicted.
    pub tx_meta_cache_capacity_per_shard: usize,
}

impl Config {
    pub fn max_mined_batch_latency(&self) -> Duration {
        Duration::from_millis(self.max_mined_batch_latency_millis)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_mined_routines: 128,
            max_mined_batch: 1_024,
            max_mined_batch_latency_millis: 50,
            max_retries: 10,
            tx_meta_cache_shards: 16,
            tx_meta_cache_capacity_per_shard: 4_096,
        }
    }
}
