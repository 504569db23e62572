//! In-memory pre-recall snapshot store.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::native::{NativeKey, NativeMessage, RecallSnapshots};

/// Recall cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Maximum number of snapshots kept; oldest are evicted first.
    pub capacity: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

#[derive(Default)]
struct Snapshots {
    by_key: HashMap<NativeKey, NativeMessage>,
    order: VecDeque<NativeKey>,
}

/// Bounded FIFO store of message content, fed as messages arrive so it can
/// stand in for them after a recall.
pub struct RecallCache {
    capacity: usize,
    inner: RwLock<Snapshots>,
}

impl RecallCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Snapshots::default()),
        }
    }

    pub fn from_config(config: &RecallConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Store `msg` as the snapshot for its key.
    ///
    /// Recalled messages are rejected; their content is already gone.
    pub async fn remember(&self, msg: &NativeMessage) -> bool {
        if msg.is_recalled() || self.capacity == 0 {
            return false;
        }

        let key = msg.key();
        let mut inner = self.inner.write().await;
        if inner.by_key.insert(key.clone(), msg.clone()).is_none() {
            inner.order.push_back(key);
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.by_key.remove(&evicted);
            }
        }
        true
    }

    pub async fn forget(&self, key: &NativeKey) -> Option<NativeMessage> {
        let mut inner = self.inner.write().await;
        let removed = inner.by_key.remove(key)?;
        inner.order.retain(|k| k != key);
        Some(removed)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_key.len()
    }
}

#[async_trait]
impl RecallSnapshots for RecallCache {
    async fn pre_recall_snapshot(&self, key: &NativeKey) -> Option<NativeMessage> {
        self.inner.read().await.by_key.get(key).cloned()
    }
}
