//! Read-through/write-through cache over a [`CacheBackend`].
//!
//! # Responsibility
//! - Memoize decoded JSON payloads for the lifetime of the process.
//! - Write every update to both the memo and the persistent backend.
//! - Provide namespaced helpers for metadata and record snapshots.
//!
//! # Invariants
//! - Prefix deletion also drops matching memo entries.
//! - Undecodable payloads read as absent.
//!
//! # Key layout
//! - `metadata/<table>`: serialized table schema.
//! - `models/<table>/<id>`: serialized record snapshot.
//! - `settings:modelMapping`: serialized model registry.

use super::CacheBackend;
use crate::model::column::TableSchema;
use crate::model::definition::MODEL_MAPPING_KEY;
use crate::model::value::FieldMap;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const METADATA_PREFIX: &str = "metadata/";
pub const RECORDS_PREFIX: &str = "models/";

pub fn metadata_key(table: &str) -> String {
    format!("{METADATA_PREFIX}{table}")
}

pub fn record_key(table: &str, id: i64) -> String {
    format!("{RECORDS_PREFIX}{table}/{id}")
}

fn table_prefix(table: &str) -> String {
    format!("{RECORDS_PREFIX}{table}/")
}

/// Cache of schema metadata and record snapshots.
pub struct RecordCache {
    backend: Rc<dyn CacheBackend>,
    memo: RefCell<HashMap<String, JsonValue>>,
}

impl RecordCache {
    pub fn new(backend: Rc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// Cache backed by a fresh [`super::MemoryCacheBackend`].
    pub fn in_memory() -> Self {
        Self::new(Rc::new(super::MemoryCacheBackend::new()))
    }

    pub fn has(&self, key: &str) -> bool {
        self.memo.borrow().contains_key(key) || self.backend.has(key)
    }

    /// Returns the decoded payload for `key`, consulting the memo first.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        if let Some(value) = self.memo.borrow().get(key) {
            debug!("event=cache_get module=cache status=hit tier=memo key={key}");
            return Some(value.clone());
        }

        let bytes = self.backend.get(key)?;
        match serde_json::from_slice::<JsonValue>(&bytes) {
            Ok(value) => {
                debug!("event=cache_get module=cache status=hit tier=backend key={key}");
                self.memo
                    .borrow_mut()
                    .insert(key.to_string(), value.clone());
                Some(value)
            }
            Err(err) => {
                warn!(
                    "event=cache_get module=cache status=error error_code=decode_failed key={key} error={err}"
                );
                None
            }
        }
    }

    /// Writes `value` to both tiers.
    pub fn set(&self, key: &str, value: JsonValue) {
        match serde_json::to_vec_pretty(&value) {
            Ok(bytes) => self.backend.set(key, &bytes),
            Err(err) => {
                warn!(
                    "event=cache_set module=cache status=error error_code=encode_failed key={key} error={err}"
                );
                return;
            }
        }
        self.memo.borrow_mut().insert(key.to_string(), value);
    }

    /// Removes `key` from both tiers; returns whether the backend held it.
    pub fn delete(&self, key: &str) -> bool {
        self.memo.borrow_mut().remove(key);
        self.backend.delete(key)
    }

    /// Removes every key under `prefix` and returns how many were persisted.
    pub fn delete_by_prefix(&self, prefix: &str) -> usize {
        let keys = self.backend.list_keys_by_prefix(prefix);
        let removed = keys.iter().filter(|key| self.backend.delete(key)).count();
        self.memo
            .borrow_mut()
            .retain(|key, _| !key.starts_with(prefix));
        debug!("event=cache_delete_prefix module=cache status=ok prefix={prefix} removed={removed}");
        removed
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(
                    "event=cache_get module=cache status=error error_code=shape_mismatch key={key} error={err}"
                );
                None
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json),
            Err(err) => warn!(
                "event=cache_set module=cache status=error error_code=encode_failed key={key} error={err}"
            ),
        }
    }

    pub fn metadata(&self, table: &str) -> Option<TableSchema> {
        self.get_json(&metadata_key(table))
    }

    pub fn set_metadata(&self, table: &str, schema: &TableSchema) {
        self.set_json(&metadata_key(table), schema);
    }

    pub fn delete_metadata(&self, table: &str) -> bool {
        self.delete(&metadata_key(table))
    }

    /// Drops all cached schemas and the model registry.
    pub fn invalidate_all_metadata(&self) -> usize {
        self.delete(MODEL_MAPPING_KEY);
        self.delete_by_prefix(METADATA_PREFIX)
    }

    pub fn get_record_data(&self, table: &str, id: i64) -> Option<FieldMap> {
        self.get_json(&record_key(table, id))
    }

    /// Caches a snapshot keyed by its `id`; snapshots without a positive id
    /// are ignored and `false` is returned.
    pub fn set_record_data(&self, table: &str, data: &FieldMap) -> bool {
        let id = data.get("id").and_then(|value| value.as_i64()).unwrap_or(0);
        if id <= 0 {
            return false;
        }
        self.set_json(&record_key(table, id), data);
        true
    }

    pub fn delete_record_data(&self, table: &str, id: i64) -> bool {
        self.delete(&record_key(table, id))
    }

    /// Drops every cached snapshot of one table.
    pub fn invalidate_table(&self, table: &str) -> usize {
        self.delete_by_prefix(&table_prefix(table))
    }

    pub fn invalidate_all_records(&self) -> usize {
        self.delete_by_prefix(RECORDS_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::{record_key, RecordCache};
    use crate::cache::{CacheBackend, MemoryCacheBackend};
    use crate::model::value::{field_map, FieldValue};
    use std::rc::Rc;

    #[test]
    fn memo_is_populated_from_backend_on_first_read() {
        let backend = Rc::new(MemoryCacheBackend::new());
        backend.set("metadata/orders", br#"{"a": 1}"#);
        let cache = RecordCache::new(backend.clone());

        assert_eq!(cache.get("metadata/orders").unwrap()["a"], 1);
        backend.delete("metadata/orders");
        assert!(cache.get("metadata/orders").is_some(), "memo should answer");
        assert!(cache.has("metadata/orders"));
    }

    #[test]
    fn undecodable_payload_reads_as_absent() {
        let backend = Rc::new(MemoryCacheBackend::new());
        backend.set("models/orders/1", b"{not json");
        let cache = RecordCache::new(backend);
        assert!(cache.get_record_data("orders", 1).is_none());
    }

    #[test]
    fn snapshots_without_id_are_not_cached() {
        let cache = RecordCache::in_memory();
        assert!(!cache.set_record_data("orders", &field_map([("name", "x")])));
        assert!(!cache.has(&record_key("orders", 0)));
    }

    #[test]
    fn delete_by_prefix_drops_memo_entries_too() {
        let backend = Rc::new(MemoryCacheBackend::new());
        let cache = RecordCache::new(backend.clone());
        for id in 1..=2 {
            cache.set_record_data("orders", &field_map([("id", FieldValue::Integer(id))]));
        }
        // Another process already removed one key from the shared backend.
        backend.delete(&record_key("orders", 2));

        assert_eq!(cache.invalidate_table("orders"), 1);
        assert!(cache.get_record_data("orders", 2).is_none());
        assert!(cache.get_record_data("orders", 1).is_none());
    }
}
