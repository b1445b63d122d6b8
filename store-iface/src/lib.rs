//! Trait boundaries for the external collaborators named in §6: the blob
//! store, the UTXO/meta store, and the gossip transport.
//!
//! No backend is implemented here: this crate exists purely so multiple
//! other crates can share request/response types without depending on a
//! concrete service.

pub mod blob_store;
pub mod error;
pub mod fetcher;
pub mod gossip;
pub mod meta_store;

#[cfg(feature = "test-support")]
pub mod testing;

pub use blob_store::{BlobStore, BlobReader, Extension};
pub use error::{ErrorKind, StoreError};
pub use fetcher::SubtreeFetcher;
pub use gossip::{BlockAnnouncement, Gossip, RejectedTx, SubtreeAnnouncement, Topic, TxMetaUpdate};
pub use meta_store::MetaStore;
