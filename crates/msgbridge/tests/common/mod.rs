//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use msgbridge::native::{
    ChatSource, DestinationSpec, MessageRelay, NativeElement, NativeKey, NativeMessage, Peer,
    PeerResolver, SourceResult,
};
use msgbridge::recall::RecallCache;
use msgbridge::{Collaborators, MessageBridge};

pub fn group() -> Peer {
    Peer::group("5001")
}

pub fn native_id(seq: u64) -> String {
    format!("{}", 7_300_000_000_000_000_000u64 + seq)
}

pub fn text_message(peer: &Peer, seq: u64, text: &str) -> NativeMessage {
    NativeMessage {
        msg_id: native_id(seq),
        msg_seq: seq,
        peer: peer.clone(),
        msg_type: 2,
        sender_id: "10001".to_string(),
        sender_name: "alice".to_string(),
        sender_card: None,
        time: 1_700_000_000 + seq as i64,
        recalled_at: None,
        elements: vec![NativeElement::Text {
            content: text.to_string(),
        }],
    }
}

/// Serves queued pages in order; single-message lookups come from `messages`.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Vec<NativeMessage>>>,
    messages: Mutex<HashMap<NativeKey, NativeMessage>>,
    pub page_calls: Mutex<Vec<u64>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, page: Vec<NativeMessage>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn insert(&self, msg: NativeMessage) {
        self.messages.lock().unwrap().insert(msg.key(), msg);
    }

    fn next_page(&self) -> Vec<NativeMessage> {
        self.pages.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl ChatSource for ScriptedSource {
    async fn latest_window(&self, _peer: &Peer, _count: usize) -> SourceResult<Vec<NativeMessage>> {
        Ok(self.next_page())
    }

    async fn page_by_seq(
        &self,
        _peer: &Peer,
        seq: u64,
        _count: usize,
        _old_to_new: bool,
        _include_anchor: bool,
    ) -> SourceResult<Vec<NativeMessage>> {
        self.page_calls.lock().unwrap().push(seq);
        Ok(self.next_page())
    }

    async fn message_by_id(
        &self,
        peer: &Peer,
        msg_id: &str,
    ) -> SourceResult<Option<NativeMessage>> {
        let key = NativeKey::new(peer.clone(), msg_id);
        Ok(self.messages.lock().unwrap().get(&key).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCall {
    Single { from: Peer, to: Peer, msg_id: String },
    Bundle { from: Peer, to: Peer, msg_ids: Vec<String> },
}

/// Records relay calls and answers with fresh native ids in the destination.
#[derive(Default)]
pub struct RecordingRelay {
    pub calls: Mutex<Vec<RelayCall>>,
    next: AtomicU64,
}

impl RecordingRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next: AtomicU64::new(9_000_000_000_000_000_000),
        })
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        self.calls.lock().unwrap().clone()
    }

    fn mint(&self, to: &Peer) -> NativeKey {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        NativeKey::new(to.clone(), id.to_string())
    }
}

#[async_trait]
impl MessageRelay for RecordingRelay {
    async fn relay_single(&self, from: &Peer, to: &Peer, msg_id: &str) -> SourceResult<NativeKey> {
        self.calls.lock().unwrap().push(RelayCall::Single {
            from: from.clone(),
            to: to.clone(),
            msg_id: msg_id.to_string(),
        });
        Ok(self.mint(to))
    }

    async fn relay_bundle(
        &self,
        from: &Peer,
        to: &Peer,
        msg_ids: &[String],
    ) -> SourceResult<NativeKey> {
        self.calls.lock().unwrap().push(RelayCall::Bundle {
            from: from.clone(),
            to: to.clone(),
            msg_ids: msg_ids.to_vec(),
        });
        Ok(self.mint(to))
    }
}

/// Resolves every destination to the peer with the same id.
pub struct IdentityPeers;

#[async_trait]
impl PeerResolver for IdentityPeers {
    async fn resolve_peer(&self, spec: &DestinationSpec) -> SourceResult<Option<Peer>> {
        Ok(Some(Peer::new(spec.chat_type, spec.target.clone())))
    }
}

pub struct Harness {
    pub bridge: MessageBridge,
    pub source: Arc<ScriptedSource>,
    pub relay: Arc<RecordingRelay>,
    pub recall: Arc<RecallCache>,
}

pub fn harness() -> Harness {
    let source = ScriptedSource::new();
    let relay = RecordingRelay::new();
    let recall = Arc::new(RecallCache::new(64));
    let collaborators = Collaborators {
        source: source.clone(),
        relay: relay.clone(),
        peers: Arc::new(IdentityPeers),
        recall: recall.clone(),
    };
    let bridge = MessageBridge::from_config(collaborators, &Default::default())
        .expect("default config is valid");
    Harness {
        bridge,
        source,
        relay,
        recall,
    }
}
