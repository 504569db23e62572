//! msgbridge core library.
//!
//! Sits between a native chat-history source (peer + opaque native message id
//! + per-peer seq) and a bot wire protocol that needs 32-bit-safe message ids
//! and count-bounded message lists.

pub mod bridge;
pub mod config;
pub mod error;
pub mod forward;
pub mod history;
pub mod materialize;
pub mod native;
pub mod recall;
pub mod registry;

pub use bridge::{Collaborators, MessageBridge};
pub use error::{BridgeError, BridgeResult};
pub use history::{Direction, FetchOutcome, HistoryPage};
pub use native::{ChatType, DestinationSpec, NativeKey, NativeMessage, Peer};
