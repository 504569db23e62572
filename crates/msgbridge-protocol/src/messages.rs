//! Wire message types.
//!
//! A wire message is a flat, ordered list of typed segments plus the sender
//! and routing fields a bot client needs. The `message_id` is always a
//! registry-minted [`WireId`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::WireId;

/// A message as delivered to wire clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Registry-minted id for this message.
    pub message_id: WireId,

    /// Per-peer sequence number from the native source.
    pub message_seq: u64,

    pub message_type: MessageType,

    /// Set for group messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Sender's user id.
    pub user_id: String,

    /// Unix seconds.
    pub time: i64,

    pub sender: WireSender,

    /// Ordered content segments.
    pub message: Vec<Segment>,

    /// CQ-code rendering of `message`.
    pub raw_message: String,
}

/// Whether a message belongs to a one-to-one or group conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Private,
    Group,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown message type: {0}")]
pub struct ParseMessageTypeError(pub String);

impl std::str::FromStr for MessageType {
    type Err = ParseMessageTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" | "friend" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            other => Err(ParseMessageTypeError(other.to_string())),
        }
    }
}

/// Sender block of a wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSender {
    pub user_id: String,
    pub nickname: String,
    /// Group card, when the sender set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
}

/// One content segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Segment {
    Text {
        text: String,
    },
    Face {
        id: String,
    },
    Image {
        file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    At {
        qq: String,
    },
    Reply {
        id: WireId,
    },
    /// A bundled multi-message record, referenced by its resource id.
    Forward {
        id: String,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn to_raw(&self) -> String {
        match self {
            Self::Text { text } => escape_text(text),
            Self::Face { id } => format!("[CQ:face,id={}]", escape_param(id)),
            Self::Image { file, .. } => format!("[CQ:image,file={}]", escape_param(file)),
            Self::At { qq } => format!("[CQ:at,qq={}]", escape_param(qq)),
            Self::Reply { id } => format!("[CQ:reply,id={id}]"),
            Self::Forward { id } => format!("[CQ:forward,id={}]", escape_param(id)),
        }
    }
}

/// Render segments into a CQ-code string.
pub fn render_raw(segments: &[Segment]) -> String {
    segments.iter().map(Segment::to_raw).collect()
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

fn escape_param(value: &str) -> String {
    escape_text(value).replace(',', "&#44;")
}
