//! Collaborator trait definitions.
//!
//! The chat kernel, the recall snapshot store and the peer directory live
//! outside this crate. These traits are the only way the bridge reaches them.

use async_trait::async_trait;

use super::{DestinationSpec, NativeKey, NativeMessage, Peer, SourceResult};

/// Read access to sequence-numbered native history.
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// The freshest `count` messages of a peer.
    async fn latest_window(&self, peer: &Peer, count: usize) -> SourceResult<Vec<NativeMessage>>;

    /// Up to `count` messages anchored at `seq`.
    ///
    /// With `old_to_new` set the window walks backwards and ends at `seq`;
    /// otherwise it walks forwards and starts at `seq`. `include_anchor`
    /// controls whether the message at `seq` itself is part of the window.
    async fn page_by_seq(
        &self,
        peer: &Peer,
        seq: u64,
        count: usize,
        old_to_new: bool,
        include_anchor: bool,
    ) -> SourceResult<Vec<NativeMessage>>;

    /// A single message by native id. `Ok(None)` when it no longer exists.
    async fn message_by_id(&self, peer: &Peer, msg_id: &str)
    -> SourceResult<Option<NativeMessage>>;
}

/// Store of message content captured before a recall.
#[async_trait]
pub trait RecallSnapshots: Send + Sync {
    async fn pre_recall_snapshot(&self, key: &NativeKey) -> Option<NativeMessage>;
}

/// Maps a wire-level destination to a native peer.
#[async_trait]
pub trait PeerResolver: Send + Sync {
    /// `Ok(None)` when the destination is unknown.
    async fn resolve_peer(&self, spec: &DestinationSpec) -> SourceResult<Option<Peer>>;
}

/// Relay calls into the chat kernel. Both return the key of the new message
/// created in the destination peer.
#[async_trait]
pub trait MessageRelay: Send + Sync {
    async fn relay_single(&self, from: &Peer, to: &Peer, msg_id: &str) -> SourceResult<NativeKey>;

    async fn relay_bundle(
        &self,
        from: &Peer,
        to: &Peer,
        msg_ids: &[String],
    ) -> SourceResult<NativeKey>;
}
