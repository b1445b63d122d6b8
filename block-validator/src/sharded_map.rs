//! The split-sharded transaction map used during validation (§4.6 checks
//! 10 and 11, §5 "shared concurrent containers"): one shard per some power
//! of the hash's leading byte, each behind its own lock, so that parallel
//! fan-out workers inserting/looking up different transactions rarely
//! contend on the same shard.

use std::{collections::HashMap, sync::Mutex};

use subtree_primitives::Hash;

/// Maps a transaction hash to its position within the block under
/// validation (`index_of(T)` in §8's ordering invariant).
pub struct ShardedTxMap {
    shards: Vec<Mutex<HashMap<Hash, usize>>>,
}

impl ShardedTxMap {
    /// `shard_count` should be a power of two; non-power-of-two counts
    /// still work correctly, just with slightly uneven shard sizes.
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        ShardedTxMap { shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect() }
    }

    fn shard_for(&self, hash: &Hash) -> &Mutex<HashMap<Hash, usize>> {
        let index = hash.as_bytes()[0] as usize % self.shards.len();
        &self.shards[index]
    }

    /// Inserts `hash -> position`. Returns `true` if `hash` was already
    /// present (a duplicate transaction, §4.6 check 10), in which case the
    /// existing position is left untouched.
    pub fn insert_if_absent(&self, hash: Hash, position: usize) -> bool {
        let mut shard = self.shard_for(&hash).lock().expect("sharded map mutex poisoned");
        if shard.contains_key(&hash) {
            true
        } else {
            shard.insert(hash, position);
            false
        }
    }

    /// Bulk insert for a batch of `(hash, position)` pairs under one shard
    /// lock acquisition per shard touched; used by parallel fan-out workers
    /// that have already partitioned their work (§5 "shard-level lock for
    /// bulk put_multi"). Returns the hashes that were already present.
    pub fn put_multi(&self, entries: &[(Hash, usize)]) -> Vec<Hash> {
        let mut duplicates = Vec::new();
        for (hash, position) in entries {
            if self.insert_if_absent(*hash, *position) {
                duplicates.push(*hash);
            }
        }
        duplicates
    }

    pub fn position_of(&self, hash: &Hash) -> Option<usize> {
        self.shard_for(hash).lock().expect("sharded map mutex poisoned").get(hash).copied()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.shard_for(hash).lock().expect("sharded map mutex poisoned").contains_key(hash)
    }
}
