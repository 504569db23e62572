//! Bridge error types.

use msgbridge_protocol::{ActionResponse, WireId};
use thiserror::Error;

use crate::native::{DestinationSpec, Peer, SourceError};

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to callers of the bridge.
///
/// Nothing here is retried internally. Empty materializations and exhausted
/// pagination are not errors and never show up as variants.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The wire id was never minted in this process.
    #[error("unknown message id: {id}")]
    UnknownWireId { id: WireId },

    /// The native message does not exist (or no longer exists) in the source.
    #[error("message {msg_id} not found in {peer}")]
    MessageNotFound { peer: Peer, msg_id: String },

    /// The destination could not be resolved to a concrete peer.
    #[error("cannot resolve destination {spec}")]
    PeerNotFound { spec: DestinationSpec },

    /// The chat source returned a non-success status.
    #[error("chat source unavailable for {peer}{}: {source}", seq_context(.seq))]
    SourceUnavailable {
        peer: Peer,
        seq: Option<u64>,
        source: SourceError,
    },

    /// The peer resolver failed while looking up a destination.
    #[error("peer lookup failed for destination {spec}: {source}")]
    PeerLookupFailed {
        spec: DestinationSpec,
        source: SourceError,
    },

    /// Every positive 32-bit id has been handed out.
    #[error("wire id space exhausted")]
    IdSpaceExhausted,

    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn seq_context(seq: &Option<u64>) -> String {
    seq.map(|seq| format!(" at seq {seq}")).unwrap_or_default()
}

impl BridgeError {
    pub(crate) fn source_unavailable(peer: &Peer, seq: Option<u64>, source: SourceError) -> Self {
        Self::SourceUnavailable {
            peer: peer.clone(),
            seq,
            source,
        }
    }

    /// Whether this is one of the recoverable not-found conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownWireId { .. } | Self::MessageNotFound { .. } | Self::PeerNotFound { .. }
        )
    }

    /// Stable snake_case code for protocol responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownWireId { .. } => "unknown_wire_id",
            Self::MessageNotFound { .. } => "message_not_found",
            Self::PeerNotFound { .. } => "peer_not_found",
            Self::SourceUnavailable { .. } | Self::PeerLookupFailed { .. } => "source_unavailable",
            Self::IdSpaceExhausted => "id_space_exhausted",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Numeric return code for protocol responses.
    pub fn retcode(&self) -> i32 {
        match self {
            Self::UnknownWireId { .. }
            | Self::MessageNotFound { .. }
            | Self::PeerNotFound { .. } => 1404,
            Self::InvalidRequest(_) => 1400,
            Self::SourceUnavailable { .. } | Self::PeerLookupFailed { .. } => 1503,
            Self::IdSpaceExhausted => 1500,
        }
    }
}

impl From<&BridgeError> for ActionResponse {
    fn from(err: &BridgeError) -> Self {
        ActionResponse::failed(err.retcode(), err.error_code(), err.to_string())
    }
}

impl From<BridgeError> for ActionResponse {
    fn from(err: BridgeError) -> Self {
        Self::from(&err)
    }
}
