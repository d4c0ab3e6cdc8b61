//! Key-value store abstraction for every piece of persisted state.
//!
//! The store is Redis-shaped: string keys, string values, atomic
//! `set_if_absent`, and unordered string sets. All keys live under the
//! `lto-anchor:` namespace (see [`keys`]).

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::IndexerError;

/// Trait implemented by every storage backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError>;

    /// Unconditional write (last writer wins).
    async fn set(&self, key: &str, value: &str) -> Result<(), IndexerError>;

    /// Write only if `key` has no value yet. Returns `true` if this call wrote.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, IndexerError>;

    /// Add `member` to the set at `key`. Returns `true` if it was not present.
    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, IndexerError>;

    /// Remove `member` from the set at `key`. Returns `true` if it was present.
    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, IndexerError>;

    /// All members of the set at `key`, sorted. Empty if the set does not exist.
    async fn members(&self, key: &str) -> Result<Vec<String>, IndexerError>;

    /// Backend identifier for logs.
    fn target(&self) -> &str;
}

/// Store key namespace.
pub mod keys {
    pub const PREFIX: &str = "lto-anchor";

    /// `lto-anchor:anchor:<hexhash>` → transaction id
    pub fn anchor(hex_hash: &str) -> String {
        format!("{PREFIX}:anchor:{hex_hash}")
    }

    /// `lto-anchor:processing-height` → last processed block height
    pub fn processing_height() -> String {
        format!("{PREFIX}:processing-height")
    }

    /// `lto-anchor:public-key:<address>` → JSON `PublicKeyRecord`
    pub fn public_key(address: &str) -> String {
        format!("{PREFIX}:public-key:{address}")
    }

    /// `lto-anchor:stats:fee-burn` → cumulative burned fees (base units)
    pub fn fee_burn() -> String {
        format!("{PREFIX}:stats:fee-burn")
    }

    /// `lto-anchor:stats:fee-burn:height` → last height counted into the fee-burn total
    pub fn fee_burn_height() -> String {
        format!("{PREFIX}:stats:fee-burn:height")
    }

    /// `lto-anchor:features:<id>:activation-height`
    pub fn feature_activation(feature_id: u16) -> String {
        format!("{PREFIX}:features:{feature_id}:activation-height")
    }

    /// Set of association edges issued by `address`.
    pub fn association_children(address: &str) -> String {
        format!("{PREFIX}:association:{address}:children")
    }

    /// Set of association edges received by `address`.
    pub fn association_parents(address: &str) -> String {
        format!("{PREFIX}:association:{address}:parents")
    }

    /// Set of verification methods attached to the DID of `address`.
    pub fn verification_methods(address: &str) -> String {
        format!("{PREFIX}:verification-method:{address}")
    }
}

// ─── In-memory store ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// In-memory store for tests and ephemeral indexers. All data is lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of plain (non-set) keys.
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), IndexerError> {
        self.inner
            .lock()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, IndexerError> {
        let mut inner = self.inner.lock();
        if inner.values.contains_key(key) {
            return Ok(false);
        }
        inner.values.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, IndexerError> {
        Ok(self
            .inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, IndexerError> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            inner.sets.remove(key);
        }
        Ok(removed)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, IndexerError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn target(&self) -> &str {
        "memory"
    }
}
