//! Two-tier caching of schema metadata and record snapshots.
//!
//! # Responsibility
//! - Define the persistent key/value backend contract.
//! - Layer a process-local memo over it (see [`RecordCache`]).
//!
//! # Invariants
//! - The persistent backend is the source of truth across processes.
//! - The memo is best-effort and never outlives the process.

mod record_cache;

pub use record_cache::{metadata_key, record_key, RecordCache, METADATA_PREFIX, RECORDS_PREFIX};

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Persistent key/value storage beneath the record cache.
pub trait CacheBackend {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]);
    /// Removes one key; returns whether it existed.
    fn delete(&self, key: &str) -> bool;
    fn list_keys_by_prefix(&self, prefix: &str) -> Vec<String>;
}

/// In-process backend keeping payloads in an ordered map.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn has(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_vec());
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.borrow_mut().remove(key).is_some()
    }

    fn list_keys_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .borrow()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}
