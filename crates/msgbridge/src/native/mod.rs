//! Native chat-source data model and collaborator seams.
//!
//! Everything in here is owned and mutated by the external chat kernel; the
//! bridge only reads it. Message ids are opaque strings (large integers in
//! practice) and must never be handed to wire clients directly.

mod error;
pub mod fixture;
mod traits;

use std::fmt;
use std::str::FromStr;

use msgbridge_protocol::MessageType;
use serde::{Deserialize, Serialize};

pub use error::{SourceError, SourceResult};
pub use traits::{ChatSource, MessageRelay, PeerResolver, RecallSnapshots};

/// Native message type discriminant of a bundled multi-message record.
pub const BUNDLE_MSG_TYPE: i32 = 8;

/// Conversation kind on the native side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Friend,
    Group,
}

impl ChatType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Friend => "friend",
            Self::Group => "group",
        }
    }

    pub fn message_type(self) -> MessageType {
        match self {
            Self::Friend => MessageType::Private,
            Self::Group => MessageType::Group,
        }
    }
}

impl From<MessageType> for ChatType {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Private => Self::Friend,
            MessageType::Group => Self::Group,
        }
    }
}

/// A native conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub chat_type: ChatType,
    pub peer_id: String,
}

impl Peer {
    pub fn new(chat_type: ChatType, peer_id: impl Into<String>) -> Self {
        Self {
            chat_type,
            peer_id: peer_id.into(),
        }
    }

    pub fn friend(peer_id: impl Into<String>) -> Self {
        Self::new(ChatType::Friend, peer_id)
    }

    pub fn group(peer_id: impl Into<String>) -> Self {
        Self::new(ChatType::Group, peer_id)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_type.as_str(), self.peer_id)
    }
}

/// Parses `friend:<id>`, `private:<id>` or `group:<id>`.
impl FromStr for Peer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <type>:<id>, got {s:?}"))?;
        if id.is_empty() {
            return Err(format!("empty peer id in {s:?}"));
        }
        let kind: MessageType = kind.parse().map_err(|e| format!("{e}"))?;
        Ok(Self::new(kind.into(), id))
    }
}

/// Uniquely identifies one message inside the native source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeKey {
    pub peer: Peer,
    pub msg_id: String,
}

impl NativeKey {
    pub fn new(peer: Peer, msg_id: impl Into<String>) -> Self {
        Self {
            peer,
            msg_id: msg_id.into(),
        }
    }
}

impl fmt::Display for NativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.msg_id)
    }
}

/// Where a forwarded message should go, before peer resolution.
///
/// `target` is whatever the wire client supplied (a group number or a user
/// number); the [`PeerResolver`] maps it to the native peer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSpec {
    pub chat_type: ChatType,
    pub target: String,
}

impl DestinationSpec {
    pub fn new(chat_type: ChatType, target: impl Into<String>) -> Self {
        Self {
            chat_type,
            target: target.into(),
        }
    }
}

impl fmt::Display for DestinationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_type.as_str(), self.target)
    }
}

impl FromStr for DestinationSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let peer: Peer = s.parse()?;
        Ok(Self::new(peer.chat_type, peer.peer_id))
    }
}

/// Which relay call a message needs when forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRoute {
    Bundle,
    Single,
}

impl RelayRoute {
    pub fn for_msg_type(msg_type: i32) -> Self {
        match msg_type {
            BUNDLE_MSG_TYPE => Self::Bundle,
            _ => Self::Single,
        }
    }
}

/// One content element of a native message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeElement {
    Text {
        content: String,
    },
    Face {
        face_id: u32,
    },
    Image {
        file_name: String,
        #[serde(default)]
        url: Option<String>,
    },
    Mention {
        uid: String,
    },
    /// Quote of another message in the same peer.
    Reply {
        source_msg_id: String,
    },
    MultiForward {
        res_id: String,
    },
    /// Kernel-generated notice (recall placeholder, join notice, ...).
    GrayTip {
        text: String,
    },
}

/// A raw message as returned by the chat source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeMessage {
    pub msg_id: String,
    pub msg_seq: u64,
    pub peer: Peer,
    /// Native type discriminant, see [`BUNDLE_MSG_TYPE`].
    #[serde(default = "default_msg_type")]
    pub msg_type: i32,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_card: Option<String>,
    /// Unix seconds.
    pub time: i64,
    /// Set once the message has been recalled (unix seconds).
    #[serde(default)]
    pub recalled_at: Option<i64>,
    #[serde(default)]
    pub elements: Vec<NativeElement>,
}

fn default_msg_type() -> i32 {
    2
}

impl NativeMessage {
    pub fn key(&self) -> NativeKey {
        NativeKey::new(self.peer.clone(), self.msg_id.clone())
    }

    pub fn is_recalled(&self) -> bool {
        self.recalled_at.is_some()
    }

    pub fn relay_route(&self) -> RelayRoute {
        RelayRoute::for_msg_type(self.msg_type)
    }
}
