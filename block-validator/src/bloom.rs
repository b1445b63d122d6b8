//! C8: a Bloom filter over each recent block's transaction hashes, used to
//! cheaply detect a transaction that's already mined on the current chain
//! before falling through to a confirming meta-store lookup (§4.6 check 11,
//! §4.8, §9 "Bloom filter on first 8 bytes").

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use subtree_primitives::Hash;

/// A Bloom filter over `u64::from_be_bytes(hash[0..8])` keys, sized for a
/// target false-positive rate (§4.8, §9). Bit-compatible across
/// implementations because the key extraction and hash scheme are fixed.
#[derive(Clone, Debug)]
pub struct BlockBloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BlockBloomFilter {
    /// Builds a filter sized for `expected_items` entries at
    /// `false_positive_rate`, using the standard optimal-size formulas:
    /// `m = ceil(-n*ln(p) / ln(2)^2)`, `k = round(m/n * ln(2))`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = (expected_items.max(1)) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);

        let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil().max(64.0);
        let k = ((m / n) * std::f64::consts::LN_2).round().clamp(1.0, 32.0) as u32;

        let num_bits = m as u64;
        let words = ((num_bits + 63) / 64).max(1);

        BlockBloomFilter { bits: vec![0u64; words as usize], num_bits, num_hashes: k }
    }

    /// Builds a filter already populated with `hashes`, as done once per
    /// newly-accepted block.
    pub fn from_hashes(hashes: impl ExactSizeIterator<Item = Hash>, false_positive_rate: f64) -> Self {
        let mut filter = Self::new(hashes.len(), false_positive_rate);
        for hash in hashes {
            filter.insert(hash.bloom_key());
        }
        filter
    }

    pub fn insert(&mut self, key: u64) {
        for index in self.bit_indices(key) {
            self.bits[(index / 64) as usize] |= 1 << (index % 64);
        }
    }

    /// Returns `true` if `key` may be a member (possibly a false positive);
    /// `false` means definitely not a member.
    pub fn has(&self, key: u64) -> bool {
        self.bit_indices(key).all(|index| self.bits[(index / 64) as usize] & (1 << (index % 64)) != 0)
    }

    /// Double hashing (Kirsch-Mitzenmacher): derives `num_hashes` bit
    /// positions from two independent hashes of `key`, avoiding the cost of
    /// `num_hashes` independent hash functions.
    fn bit_indices(&self, key: u64) -> impl Iterator<Item = u64> + '_ {
        let h1 = key;
        let h2 = splitmix64(key);
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }
}

/// A fast, well-distributed mixing function used to derive the Bloom
/// filter's second hash from a single `u64` key.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Process-wide counters for Bloom cross-check activity (§4.8), observed
/// through the `metrics` facade and exposed here so this crate's own
/// tests can assert on concrete values.
#[derive(Default)]
pub struct BloomStats {
    queries: AtomicU64,
    positives: AtomicU64,
    false_positives: AtomicU64,
}

impl BloomStats {
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
    pub fn positives(&self) -> u64 {
        self.positives.load(Ordering::Relaxed)
    }
    pub fn false_positives(&self) -> u64 {
        self.false_positives.load(Ordering::Relaxed)
    }

    fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("block_validator.bloom.queries");
    }

    fn record_positive(&self) {
        self.positives.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("block_validator.bloom.positives");
    }

    fn record_false_positive(&self) {
        self.false_positives.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("block_validator.bloom.false_positives");
    }
}

/// A bounded ring of the last `capacity` blocks' Bloom filters, keyed by
/// block hash, used by §4.6 check 11's cross-chain-mined probe.
pub struct BloomIndex {
    capacity: usize,
    filters: IndexMap<Hash, BlockBloomFilter>,
    pub stats: BloomStats,
}

impl BloomIndex {
    pub fn new(capacity: usize) -> Self {
        BloomIndex { capacity: capacity.max(1), filters: IndexMap::new(), stats: BloomStats::default() }
    }

    /// Inserts `block_hash`'s filter, evicting the oldest entry if the ring
    /// is already at capacity.
    pub fn insert(&mut self, block_hash: Hash, filter: BlockBloomFilter) {
        if self.filters.len() >= self.capacity && !self.filters.contains_key(&block_hash) {
            self.filters.shift_remove_index(0);
        }
        self.filters.insert(block_hash, filter);
    }

    /// Probes every retained filter for `tx_hash`, calling `confirm` (the
    /// meta-store lookup) on any hit to resolve whether it's a true
    /// positive. Returns `true` only on a confirmed true positive (§4.6
    /// check 11's final sub-check).
    pub async fn probe_and_confirm<F, Fut>(&self, tx_hash: Hash, mut confirm: F) -> bool
    where
        F: FnMut(Hash) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let key = tx_hash.bloom_key();
        for filter in self.filters.values() {
            self.stats.record_query();
            if filter.has(key) {
                self.stats.record_positive();
                if confirm(tx_hash).await {
                    return true;
                }
                self.stats.record_false_positive();
            }
        }
        false
    }
}
