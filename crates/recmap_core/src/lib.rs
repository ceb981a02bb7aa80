//! Metadata-driven record mapping.
//!
//! Records map one table row to a dynamic field map. Column metadata comes
//! from the store at runtime and drives value encoding, filters and
//! auto-maintained fields. Schemas and row snapshots are cached through a
//! pluggable [`cache::CacheBackend`].

pub mod cache;
pub mod codec;
pub mod db;
pub mod logging;
pub mod model;
pub mod record;
pub mod schema;
pub mod store;
pub mod template;

pub use cache::{CacheBackend, MemoryCacheBackend, RecordCache};
pub use codec::{Literal, ValueCodec};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::column::{ColumnDescriptor, TableSchema, TypeCategory};
pub use model::definition::{ModelDefinition, ModelRegistry, QueryOperation};
pub use model::value::{field_map, FieldMap, FieldValue};
pub use record::{
    translate_data, AccessAction, ListOptions, LocalisationDigest, Localisations, ModelContext,
    ModelHooks, NoHooks, Paging, Record, RecordError, RecordResult, Session, DECODED_I18N_FIELD,
    FAILED, I18N_FIELD,
};
pub use schema::SchemaCatalog;
pub use store::{
    DescribeRow, HistoryOperation, HistoryRecorder, SqliteHistory, SqliteStore, Store,
    StoreError, StoreResult,
};
pub use template::{template_params, QueryTemplates, TemplateParams, TemplateSet};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
