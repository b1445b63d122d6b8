//! The peer-to-peer gossip transport boundary (§6).
//!
//! Framing and peer discovery are external collaborators (§1); this module
//! only fixes the message shapes carried on each topic and the
//! publish/subscribe capability the rest of the workspace depends on.

use async_trait::async_trait;
use subtree_primitives::{BlockHeader, Hash, TxMeta};
use tokio::sync::broadcast;

use crate::error::StoreError;

/// A subtree announcement: who has it and where to fetch it from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtreeAnnouncement {
    /// 30-byte peer id.
    pub peer_id: [u8; 30],
    pub subtree_hash: Hash,
    pub peer_base_url: String,
}

/// A block announcement: the header plus the roots of its subtrees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAnnouncement {
    pub header: BlockHeader,
    pub subtree_roots: Vec<Hash>,
}

/// An update to a transaction's cached metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxMetaUpdate {
    pub hash: Hash,
    pub meta: TxMeta,
}

/// A peer rejected one of our transactions.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RejectedTx {
    pub tx_id: String,
    pub reason: String,
}

/// The four gossip topics named in §6. Subscribers see messages in arrival
/// order on their own topic; no ordering is guaranteed across topics.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Subtree,
    Block,
    TxMeta,
    RejectedTx,
}

#[async_trait]
pub trait Gossip: Send + Sync {
    async fn publish_subtree(&self, announcement: SubtreeAnnouncement) -> Result<(), StoreError>;

    async fn publish_block(&self, announcement: BlockAnnouncement) -> Result<(), StoreError>;

    async fn publish_tx_meta(&self, update: TxMetaUpdate) -> Result<(), StoreError>;

    async fn publish_rejected_tx(&self, rejected: RejectedTx) -> Result<(), StoreError>;

    /// Subscribes to the `TxMeta` topic. Each call returns an independent
    /// receiver seeing every update published from this point forward;
    /// a subscriber that falls behind the channel's capacity observes a
    /// `Lagged` error and should treat its cache as stale rather than
    /// retry the read.
    fn subscribe_tx_meta(&self) -> broadcast::Receiver<TxMetaUpdate>;
}
