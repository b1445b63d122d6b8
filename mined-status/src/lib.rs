//! The write-path half of the store-iface collaborators (§2 C7, C9):
//! marking transactions mined once their block is accepted, and a
//! sharded bounded cache of transaction metadata kept warm by gossip.
//!
//! Built on `tower-batch` (originally a signature-batch-verification
//! combinator), generalised here to fold per-transaction "mark mined"
//! calls into `set_mined_multi` batches.

mod config;
mod error;
mod txmeta_cache;
mod updater;

pub use config::Config;
pub use error::UpdaterError;
pub use txmeta_cache::{ShardedTxMetaCache, TxMetaCache};
pub use updater::{MarkMinedRequest, MinedStatusUpdater};
