//! Schema metadata resolution with caching.
//!
//! # Responsibility
//! - Resolve the column descriptors of a table once per process.
//! - Read through the record cache before asking the store.
//!
//! # Invariants
//! - A failed or empty introspection yields an empty schema; nothing is
//!   cached for it, so the next call asks the store again.
//! - Schemas are shared read-only through `Rc`.
//! - A memoized schema is served only while the cache still holds its
//!   metadata entry, so `RecordCache::delete_metadata` and
//!   `invalidate_all_metadata` reach live catalogs too.

use crate::cache::{metadata_key, RecordCache};
use crate::model::column::{ColumnDescriptor, TableSchema};
use crate::store::Store;
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// Memoizing resolver of table schemas.
pub struct SchemaCatalog<'a> {
    store: &'a dyn Store,
    cache: &'a RecordCache,
    schemas: RefCell<HashMap<String, Rc<TableSchema>>>,
}

impl<'a> SchemaCatalog<'a> {
    pub fn new(store: &'a dyn Store, cache: &'a RecordCache) -> Self {
        Self {
            store,
            cache,
            schemas: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the schema of `table`, empty when it cannot be determined.
    pub fn schema(&self, table: &str) -> Rc<TableSchema> {
        let memoized = self.schemas.borrow().get(table).cloned();
        if let Some(schema) = memoized {
            if self.cache.has(&metadata_key(table)) {
                return schema;
            }
            debug!("event=schema_resolve module=schema status=stale table={table}");
            self.schemas.borrow_mut().remove(table);
        }

        if let Some(schema) = self.cache.metadata(table) {
            debug!(
                "event=schema_resolve module=schema status=hit source=cache table={table} columns={}",
                schema.len()
            );
            return self.remember(table, schema);
        }

        let schema = self.introspect(table);
        if schema.is_empty() {
            return Rc::new(schema);
        }
        self.cache.set_metadata(table, &schema);
        self.remember(table, schema)
    }

    /// Returns one column of `table`, if known.
    pub fn column(&self, table: &str, name: &str) -> Option<ColumnDescriptor> {
        self.schema(table).get(name).cloned()
    }

    /// Forgets one table in the memo and the cache.
    pub fn invalidate(&self, table: &str) {
        self.schemas.borrow_mut().remove(table);
        self.cache.delete_metadata(table);
    }

    /// Forgets every schema; returns the number of cache entries removed.
    pub fn invalidate_all(&self) -> usize {
        self.schemas.borrow_mut().clear();
        self.cache.invalidate_all_metadata()
    }

    fn remember(&self, table: &str, schema: TableSchema) -> Rc<TableSchema> {
        let schema = Rc::new(schema);
        self.schemas
            .borrow_mut()
            .insert(table.to_string(), Rc::clone(&schema));
        schema
    }

    fn introspect(&self, table: &str) -> TableSchema {
        let started_at = Instant::now();
        match self.store.describe_table(table) {
            Ok(rows) => {
                let schema: TableSchema = rows
                    .iter()
                    .map(|row| (row.field.clone(), ColumnDescriptor::from_describe(table, row)))
                    .collect();
                debug!(
                    "event=schema_resolve module=schema status=ok source=store table={table} columns={} duration_ms={}",
                    schema.len(),
                    started_at.elapsed().as_millis()
                );
                schema
            }
            Err(err) => {
                warn!(
                    "event=schema_resolve module=schema status=error table={table} error_code=describe_failed error={err}"
                );
                TableSchema::new()
            }
        }
    }
}
