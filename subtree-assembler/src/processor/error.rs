//! Errors the owner task can hand back to a caller (§4.3, §7).
//!
//! A failed `add_node` is logged and dropped, never returned here (§4.3
//! Failure semantics); these variants cover `move_up`/`move_down`/`reorg`
//! only, where failure is fatal to the in-flight request but not to the
//! owner task itself unless explicitly noted.

use subtree_primitives::Hash;

/// An error produced by a `move_up`/`move_down`/`reorg` request.
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum ProcessorError {
    /// fetching subtree {0} failed: {1}
    Fetch(Hash, #[source] store_iface::StoreError),
    /// block references subtree {0}, which was never fetched
    MissingSubtreeSlice(Hash),
    /// owner task has shut down
    Gone,
}
