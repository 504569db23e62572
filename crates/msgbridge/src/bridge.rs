//! Caller-facing bridge.
//!
//! [`MessageBridge`] wires the registry, materializer, history fetcher and
//! forward resolver to one set of collaborators and exposes the operations a
//! wire-protocol command layer needs.

use std::sync::Arc;

use msgbridge_protocol::{MessageRef, WireId, WireMessage};

use crate::config::AppConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::forward::ForwardResolver;
use crate::history::{Direction, HistoryConfig, HistoryFetcher, HistoryPage, HistoryRequest};
use crate::materialize::Materializer;
use crate::native::{
    ChatSource, DestinationSpec, MessageRelay, NativeKey, Peer, PeerResolver, RecallSnapshots,
};
use crate::registry::IdRegistry;

/// External collaborators the bridge talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ChatSource>,
    pub relay: Arc<dyn MessageRelay>,
    pub peers: Arc<dyn PeerResolver>,
    pub recall: Arc<dyn RecallSnapshots>,
}

pub struct MessageBridge {
    registry: Arc<IdRegistry>,
    materializer: Arc<Materializer>,
    history: HistoryFetcher,
    forward: ForwardResolver,
}

impl MessageBridge {
    pub fn new(
        collaborators: Collaborators,
        registry: Arc<IdRegistry>,
        history: HistoryConfig,
    ) -> Self {
        let Collaborators {
            source,
            relay,
            peers,
            recall,
        } = collaborators;
        let materializer = Arc::new(Materializer::new(registry.clone(), recall));
        Self {
            history: HistoryFetcher::new(source.clone(), materializer.clone(), history),
            forward: ForwardResolver::new(registry.clone(), source, relay, peers),
            materializer,
            registry,
        }
    }

    pub fn from_config(collaborators: Collaborators, config: &AppConfig) -> BridgeResult<Self> {
        let registry = Arc::new(IdRegistry::from_config(&config.registry)?);
        Ok(Self::new(collaborators, registry, config.history.clone()))
    }

    pub fn registry(&self) -> &Arc<IdRegistry> {
        &self.registry
    }

    /// Up to `count` renderable messages next to `anchor_seq`, ascending by seq.
    pub async fn fetch_history(
        &self,
        peer: &Peer,
        count: usize,
        direction: Direction,
        anchor_seq: Option<u64>,
    ) -> BridgeResult<HistoryPage> {
        self.history
            .fetch(&HistoryRequest {
                peer: peer.clone(),
                count,
                direction,
                anchor_seq,
            })
            .await
    }

    pub fn allocate_id(&self, key: &NativeKey) -> BridgeResult<WireId> {
        self.registry.allocate(key)
    }

    pub fn resolve_id(&self, id: WireId) -> BridgeResult<NativeKey> {
        self.registry.resolve_key(id)
    }

    /// Forward a message given the raw id a client sent.
    pub async fn forward_message(
        &self,
        source_id: i64,
        source_peer: &Peer,
        destination: &DestinationSpec,
    ) -> BridgeResult<WireId> {
        self.forward
            .forward(MessageRef::from_raw(source_id), source_peer, destination)
            .await
    }

    /// A single message, recall-aware.
    pub async fn get_message(&self, id: i64, peer: &Peer) -> BridgeResult<WireMessage> {
        let msg = self
            .forward
            .resolve_source(MessageRef::from_raw(id), peer)
            .await?;
        self.materializer
            .materialize(&msg)
            .await?
            .ok_or(BridgeError::MessageNotFound {
                peer: msg.peer,
                msg_id: msg.msg_id,
            })
    }
}
