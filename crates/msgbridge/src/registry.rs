//! Wire id registry.
//!
//! Bidirectional mapping between native message keys and compact wire ids.
//! Entries live for the lifetime of the process; nothing is persisted, so a
//! restarted bridge cannot resolve ids minted by a previous run.
//!
//! Allocation is a synchronous check-and-insert under the key's map shard
//! lock. It never awaits, so interleaved tasks cannot mint two ids for the
//! same key.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use msgbridge_protocol::{MessageRef, WireId};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativeKey, Peer};

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// First wire id handed out. Must be positive.
    pub start_id: i32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { start_id: 1 }
    }
}

/// Process-wide wire id table.
pub struct IdRegistry {
    by_key: DashMap<NativeKey, WireId>,
    by_id: DashMap<WireId, NativeKey>,
    /// Next id to mint; may run one past `i32::MAX` once exhausted.
    next: AtomicI64,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::with_start(1)
    }

    /// Start minting at `start_id` (clamped to at least 1).
    pub fn with_start(start_id: i32) -> Self {
        Self {
            by_key: DashMap::new(),
            by_id: DashMap::new(),
            next: AtomicI64::new(i64::from(start_id.max(1))),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> BridgeResult<Self> {
        if config.start_id < 1 {
            return Err(BridgeError::InvalidRequest(format!(
                "registry start id must be positive, got {}",
                config.start_id
            )));
        }
        Ok(Self::with_start(config.start_id))
    }

    /// Return the wire id for `key`, minting one on first sight.
    ///
    /// Keys that already have an id always get it back, even after the id
    /// space is exhausted.
    pub fn allocate(&self, key: &NativeKey) -> BridgeResult<WireId> {
        if let Some(id) = self.by_key.get(key) {
            return Ok(*id);
        }

        match self.by_key.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let id = self.mint()?;
                self.by_id.insert(id, key.clone());
                entry.insert(id);
                debug!("allocated wire id {} for {}", id, key);
                Ok(id)
            }
        }
    }

    fn mint(&self) -> BridgeResult<WireId> {
        let limit = i64::from(i32::MAX);
        let minted = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next <= limit).then_some(next + 1)
            })
            .ok()
            .and_then(|value| i32::try_from(value).ok());

        match minted {
            Some(value) => Ok(WireId::new(value)),
            None => {
                warn!("wire id space exhausted after {} entries", self.by_id.len());
                Err(BridgeError::IdSpaceExhausted)
            }
        }
    }

    /// Existing id for `key`, without allocating.
    pub fn lookup(&self, key: &NativeKey) -> Option<WireId> {
        self.by_key.get(key).map(|id| *id)
    }

    pub fn resolve_key(&self, id: WireId) -> BridgeResult<NativeKey> {
        self.by_id
            .get(&id)
            .map(|key| key.clone())
            .ok_or(BridgeError::UnknownWireId { id })
    }

    /// Native message id behind a wire id.
    pub fn resolve_native_id(&self, id: WireId) -> BridgeResult<String> {
        self.resolve_key(id).map(|key| key.msg_id)
    }

    /// Resolve a client-supplied reference to a native key.
    ///
    /// Long-form references are native ids already and are paired with
    /// `peer`; wire references must have been minted by this registry.
    pub fn resolve_ref(&self, reference: MessageRef, peer: &Peer) -> BridgeResult<NativeKey> {
        match reference {
            MessageRef::Wire(id) => self.resolve_key(id),
            MessageRef::Long(raw) => Ok(NativeKey::new(peer.clone(), raw.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
