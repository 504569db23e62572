//! File-backed chat source for offline inspection.
//!
//! Loads an exported history (JSON) into memory and serves it through the
//! same collaborator traits the live kernel implements. Relay calls append
//! to the in-memory copy only; the file on disk is never modified.
//!
//! File layout:
//!
//! ```json
//! {
//!   "aliases": [{"chat_type": "friend", "target": "10002", "peer_id": "u_abc"}],
//!   "messages": [{"msg_id": "7301", "msg_seq": 1, "peer": {...}, ...}],
//!   "snapshots": [ /* pre-recall copies of recalled messages */ ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    BUNDLE_MSG_TYPE, ChatSource, ChatType, DestinationSpec, MessageRelay, NativeElement,
    NativeKey, NativeMessage, Peer, PeerResolver, SourceError, SourceResult,
};

/// Status code used for missing fixture messages.
const STATUS_NOT_FOUND: i32 = 404;

/// Maps a wire-level target to a native peer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAlias {
    pub chat_type: ChatType,
    pub target: String,
    pub peer_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    #[serde(default)]
    pub aliases: Vec<PeerAlias>,
    #[serde(default)]
    pub messages: Vec<NativeMessage>,
    /// Content captured before a recall; not served by the source itself.
    #[serde(default)]
    pub snapshots: Vec<NativeMessage>,
}

impl FixtureFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let file: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        tracing::debug!(
            "loaded {} messages and {} snapshots from fixture {}",
            file.messages.len(),
            file.snapshots.len(),
            path.display()
        );
        Ok(file)
    }
}

#[derive(Debug, Default)]
struct FixtureState {
    history: HashMap<Peer, BTreeMap<u64, NativeMessage>>,
    aliases: HashMap<(ChatType, String), String>,
    next_msg_id: u64,
}

impl FixtureState {
    fn find(&self, peer: &Peer, msg_id: &str) -> Option<&NativeMessage> {
        self.history
            .get(peer)?
            .values()
            .find(|msg| msg.msg_id == msg_id)
    }

    fn append(&mut self, mut msg: NativeMessage) -> NativeKey {
        let entries = self.history.entry(msg.peer.clone()).or_default();
        msg.msg_seq = entries.keys().next_back().map_or(1, |seq| seq + 1);
        msg.msg_id = self.next_msg_id.to_string();
        self.next_msg_id += 1;
        let key = msg.key();
        entries.insert(msg.msg_seq, msg);
        key
    }
}

/// In-memory chat source built from a fixture file.
#[derive(Debug, Default)]
pub struct FixtureSource {
    state: RwLock<FixtureState>,
}

impl FixtureSource {
    pub fn from_file(file: FixtureFile) -> Self {
        let mut state = FixtureState::default();
        let mut max_id = 0u64;

        for msg in file.messages {
            if let Ok(id) = msg.msg_id.parse::<u64>() {
                max_id = max_id.max(id);
            }
            state
                .history
                .entry(msg.peer.clone())
                .or_default()
                .insert(msg.msg_seq, msg);
        }
        for alias in file.aliases {
            state
                .aliases
                .insert((alias.chat_type, alias.target), alias.peer_id);
        }
        state.next_msg_id = max_id + 1;

        Self {
            state: RwLock::new(state),
        }
    }

    pub fn from_messages(messages: Vec<NativeMessage>) -> Self {
        Self::from_file(FixtureFile {
            messages,
            ..FixtureFile::default()
        })
    }

    /// Mark a message as recalled, replacing its content with a gray tip.
    ///
    /// Returns the pre-recall message so callers can feed a snapshot store.
    pub async fn recall(&self, key: &NativeKey, at: i64) -> Option<NativeMessage> {
        let mut state = self.state.write().await;
        let msg = state
            .history
            .get_mut(&key.peer)?
            .values_mut()
            .find(|msg| msg.msg_id == key.msg_id)?;
        let before = msg.clone();
        msg.recalled_at = Some(at);
        msg.elements = vec![NativeElement::GrayTip {
            text: format!("{} recalled a message", msg.sender_name),
        }];
        Some(before)
    }
}

#[async_trait]
impl ChatSource for FixtureSource {
    async fn latest_window(&self, peer: &Peer, count: usize) -> SourceResult<Vec<NativeMessage>> {
        let state = self.state.read().await;
        let Some(entries) = state.history.get(peer) else {
            return Ok(Vec::new());
        };
        let mut window: Vec<_> = entries.values().rev().take(count).cloned().collect();
        window.reverse();
        Ok(window)
    }

    async fn page_by_seq(
        &self,
        peer: &Peer,
        seq: u64,
        count: usize,
        old_to_new: bool,
        include_anchor: bool,
    ) -> SourceResult<Vec<NativeMessage>> {
        let state = self.state.read().await;
        let Some(entries) = state.history.get(peer) else {
            return Ok(Vec::new());
        };

        let page = if old_to_new {
            let mut page: Vec<_> = entries
                .range(..=seq)
                .rev()
                .filter(|(s, _)| include_anchor || **s != seq)
                .take(count)
                .map(|(_, msg)| msg.clone())
                .collect();
            page.reverse();
            page
        } else {
            entries
                .range(seq..)
                .filter(|(s, _)| include_anchor || **s != seq)
                .take(count)
                .map(|(_, msg)| msg.clone())
                .collect()
        };
        Ok(page)
    }

    async fn message_by_id(
        &self,
        peer: &Peer,
        msg_id: &str,
    ) -> SourceResult<Option<NativeMessage>> {
        Ok(self.state.read().await.find(peer, msg_id).cloned())
    }
}

#[async_trait]
impl MessageRelay for FixtureSource {
    async fn relay_single(&self, from: &Peer, to: &Peer, msg_id: &str) -> SourceResult<NativeKey> {
        let mut state = self.state.write().await;
        let mut msg = state
            .find(from, msg_id)
            .cloned()
            .ok_or_else(|| SourceError::new(STATUS_NOT_FOUND, format!("no message {msg_id}")))?;
        msg.peer = to.clone();
        msg.time = chrono::Utc::now().timestamp();
        msg.recalled_at = None;
        Ok(state.append(msg))
    }

    async fn relay_bundle(
        &self,
        from: &Peer,
        to: &Peer,
        msg_ids: &[String],
    ) -> SourceResult<NativeKey> {
        let mut state = self.state.write().await;
        let mut elements = Vec::new();
        let mut sender = None;
        for msg_id in msg_ids {
            let msg = state
                .find(from, msg_id)
                .ok_or_else(|| SourceError::new(STATUS_NOT_FOUND, format!("no message {msg_id}")))?;
            if msg.msg_type == BUNDLE_MSG_TYPE {
                elements.extend(msg.elements.iter().cloned());
            }
            if sender.is_none() {
                sender = Some((msg.sender_id.clone(), msg.sender_name.clone()));
            }
        }
        if elements.is_empty() {
            elements.push(NativeElement::MultiForward {
                res_id: format!("fixture-res-{}", state.next_msg_id),
            });
        }
        let (sender_id, sender_name) = sender.unwrap_or_default();

        Ok(state.append(NativeMessage {
            msg_id: String::new(),
            msg_seq: 0,
            peer: to.clone(),
            msg_type: BUNDLE_MSG_TYPE,
            sender_id,
            sender_name,
            sender_card: None,
            time: chrono::Utc::now().timestamp(),
            recalled_at: None,
            elements,
        }))
    }
}

#[async_trait]
impl PeerResolver for FixtureSource {
    async fn resolve_peer(&self, spec: &DestinationSpec) -> SourceResult<Option<Peer>> {
        let state = self.state.read().await;
        if let Some(peer_id) = state.aliases.get(&(spec.chat_type, spec.target.clone())) {
            return Ok(Some(Peer::new(spec.chat_type, peer_id.clone())));
        }
        let direct = Peer::new(spec.chat_type, spec.target.clone());
        Ok(state.history.contains_key(&direct).then_some(direct))
    }
}
