//! The remove-map (§3, §5): a concurrent hash set of transaction hashes
//! scheduled for suppression while still sitting in the intake queue.
//!
//! Callers outside the owner task (typically the validator, on detecting a
//! double-spend) insert directly; the owner task's queue-drain step checks
//! and clears entries as it dequeues nodes (§4.3 default loop step 2). This
//! is the one piece of processor-adjacent state that is *not* owned
//! exclusively by the owner task, per §5's "shared concurrent containers".

use std::{collections::HashSet, sync::Mutex};

use subtree_primitives::Hash;

#[derive(Default)]
pub struct RemoveMap {
    suppressed: Mutex<HashSet<Hash>>,
}

impl RemoveMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `hash` for suppression.
    pub fn insert(&self, hash: Hash) {
        self.suppressed.lock().expect("remove-map mutex poisoned").insert(hash);
    }

    /// Returns `true` and clears the entry if `hash` was scheduled for
    /// suppression.
    pub fn take(&self, hash: &Hash) -> bool {
        self.suppressed.lock().expect("remove-map mutex poisoned").remove(hash)
    }
}
