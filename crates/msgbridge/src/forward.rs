//! Forward resolver.

use std::sync::Arc;

use msgbridge_protocol::{MessageRef, WireId};

use crate::error::{BridgeError, BridgeResult};
use crate::native::{
    ChatSource, DestinationSpec, MessageRelay, NativeKey, NativeMessage, Peer, PeerResolver,
    RelayRoute,
};
use crate::registry::IdRegistry;

/// Resolves a wire reference back to its native message and relays it.
pub struct ForwardResolver {
    registry: Arc<IdRegistry>,
    source: Arc<dyn ChatSource>,
    relay: Arc<dyn MessageRelay>,
    peers: Arc<dyn PeerResolver>,
}

impl ForwardResolver {
    pub fn new(
        registry: Arc<IdRegistry>,
        source: Arc<dyn ChatSource>,
        relay: Arc<dyn MessageRelay>,
        peers: Arc<dyn PeerResolver>,
    ) -> Self {
        Self {
            registry,
            source,
            relay,
            peers,
        }
    }

    /// Fetch the native message behind `reference`.
    ///
    /// Wire references carry their own peer; long-form references are looked
    /// up in `peer`.
    pub async fn resolve_source(
        &self,
        reference: MessageRef,
        peer: &Peer,
    ) -> BridgeResult<NativeMessage> {
        let key = self.registry.resolve_ref(reference, peer)?;
        self.source
            .message_by_id(&key.peer, &key.msg_id)
            .await
            .map_err(|e| BridgeError::source_unavailable(&key.peer, None, e))?
            .ok_or(BridgeError::MessageNotFound {
                peer: key.peer,
                msg_id: key.msg_id,
            })
    }

    /// Relay the referenced message to `destination` and return a fresh wire
    /// id for the copy. The source message keeps its own id.
    pub async fn forward(
        &self,
        reference: MessageRef,
        source_peer: &Peer,
        destination: &DestinationSpec,
    ) -> BridgeResult<WireId> {
        let msg = self.resolve_source(reference, source_peer).await?;

        let to = self
            .peers
            .resolve_peer(destination)
            .await
            .map_err(|e| {
                tracing::warn!("peer lookup for {} failed: {}", destination, e);
                BridgeError::PeerLookupFailed {
                    spec: destination.clone(),
                    source: e,
                }
            })?
            .ok_or_else(|| BridgeError::PeerNotFound {
                spec: destination.clone(),
            })?;

        let route = msg.relay_route();
        let relayed: NativeKey = match route {
            RelayRoute::Bundle => {
                self.relay
                    .relay_bundle(&msg.peer, &to, std::slice::from_ref(&msg.msg_id))
                    .await
            }
            RelayRoute::Single => self.relay.relay_single(&msg.peer, &to, &msg.msg_id).await,
        }
        .map_err(|e| BridgeError::source_unavailable(&to, None, e))?;

        let id = self.registry.allocate(&relayed)?;
        tracing::info!(
            "forwarded {} ({:?}) from {} to {} as wire id {}",
            msg.msg_id,
            route,
            msg.peer,
            to,
            id
        );
        Ok(id)
    }
}
