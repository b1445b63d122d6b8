//! Configuration recognised by the validator and its fetch/concurrency
//! plumbing (§6).

/// Configuration for block validation and subtree fetching.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// The leaf capacity subtrees referenced by a candidate block were
    /// written with; must match the assembler's own
    /// `initial_merkle_items_per_subtree` for a given deployment.
    pub leaf_capacity: u64,

    /// Concurrency cap for §4.6 check 11's "parent not in this block"
    /// lookups, which are store-bound batched reads rather than CPU-bound
    /// work, so the cap is much higher than `num_cpus`.
    pub block_valid_order_and_blessed_concurrency: usize,

    /// Concurrency cap for §4.6 check 10's duplicate-hash scan.
    pub block_check_duplicate_transactions_concurrency: usize,

    /// Concurrency cap for §4.6 check 6's parallel subtree fetch.
    pub block_get_and_validate_subtrees_concurrency: usize,

    /// Number of recent blocks the Bloom-filter index (C8) retains.
    pub bloom_filter_recent_blocks: usize,

    /// Target false-positive rate for each block's Bloom filter (§4.8).
    pub bloom_filter_false_positive_rate: f64,

    /// Initial backoff for a retried subtree/meta fetch (§4.5).
    pub fetch_initial_backoff_millis: u64,

    /// Backoff cap for a retried subtree/meta fetch (§4.5).
    pub fetch_max_backoff_millis: u64,

    /// Maximum fetch attempts before surfacing a storage error (§4.5, §7).
    pub fetch_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        let cpus = num_cpus();
        Config {
            leaf_capacity: 1_048_576,
            block_valid_order_and_blessed_concurrency: 32_000,
            block_check_duplicate_transactions_concurrency: (cpus / 2).max(4),
            block_get_and_validate_subtrees_concurrency: (cpus / 2).max(4),
            bloom_filter_recent_blocks: 288,
            bloom_filter_false_positive_rate: 1e-6,
            fetch_initial_backoff_millis: 1_000,
            fetch_max_backoff_millis: 30_000,
            fetch_max_attempts: 5,
        }
    }
}

/// A small stand-in for the `num_cpus` crate's `get()`: the teacher depends
/// on `num_cpus` transitively through `rayon`, but this workspace has no
/// direct dependency on it, so the default falls back to a sane constant
/// when the platform can't report a count.
fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
