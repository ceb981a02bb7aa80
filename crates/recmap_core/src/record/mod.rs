//! Active records bound to one table row.
//!
//! # Responsibility
//! - Hold the persisted snapshot, pending changes and pre-mutation snapshot
//!   of one row.
//! - Load rows through the store (and the record cache when enabled).
//! - Host the mutation, query and localisation operations
//!   (`mutation`, `query`, `i18n` submodules).
//!
//! # Invariants
//! - `get(field)` prefers a pending change over the persisted value.
//! - `set(field, ..)` only buffers fields already present in `data`.
//! - Collaborators are injected through [`ModelContext`]; no globals.

mod i18n;
mod mutation;
mod query;

pub use i18n::{
    decode_localisations, translate_data, LocalisationDigest, Localisations, DECODED_I18N_FIELD,
    I18N_FIELD,
};
pub use query::{build_filter, where_clause, ListOptions, Paging};

use crate::cache::RecordCache;
use crate::codec::ValueCodec;
use crate::model::column::{ColumnDescriptor, TableSchema};
use crate::model::definition::{ModelDefinition, ModelRegistry, QueryOperation};
use crate::model::value::{FieldMap, FieldValue};
use crate::schema::SchemaCatalog;
use crate::store::{HistoryRecorder, Store};
use crate::template::{template_params, QueryTemplates, TemplateParams};
use chrono::NaiveDateTime;
use log::{debug, error, warn};
use once_cell::unsync::OnceCell;
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Sentinel returned by operations that did not produce an id.
pub const FAILED: i64 = -1;

pub type RecordResult<T> = Result<T, RecordError>;

/// Contract violations raised by record mutations.
///
/// Data-dependent failures are reported through [`FAILED`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Previous changes were discarded without providing replacements.
    EmptyReplacement,
    /// Pending `id` differs from the loaded row's id.
    ConflictingId { loaded: i64, supplied: FieldValue },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyReplacement => {
                write!(f, "cannot discard pending changes without providing new ones")
            }
            Self::ConflictingId { loaded, supplied } => {
                write!(f, "pending id `{supplied}` does not match loaded id {loaded}")
            }
        }
    }
}

impl Error for RecordError {}

/// Mutation kinds checked by [`ModelHooks::check_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Insert,
    Update,
    Delete,
}

/// Per-model lifecycle hooks.
///
/// Hooks run before the change buffer is cleared, so they can inspect
/// pending changes and `last_data()`.
pub trait ModelHooks {
    fn check_access(&self, _record: &Record<'_>, _action: AccessAction) -> bool {
        true
    }
    fn on_load(&self, _record: &Record<'_>, _id: i64) {}
    fn on_insert(&self, _record: &Record<'_>, _id: i64) {}
    fn on_update(&self, _record: &Record<'_>, _id: i64) {}
    fn on_delete(&self, _record: &Record<'_>, _id: i64) {}
}

/// Hooks that allow everything and do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ModelHooks for NoHooks {}

/// Request-scoped caller information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Written to `editor` columns; `0` when anonymous.
    pub user_id: i64,
    /// Active language code for localisation lookups.
    pub language: String,
}

/// Collaborators shared by every record of one request.
pub struct ModelContext<'a> {
    store: &'a dyn Store,
    cache: &'a RecordCache,
    catalog: SchemaCatalog<'a>,
    templates: &'a dyn QueryTemplates,
    registry: ModelRegistry,
    history: Option<&'a dyn HistoryRecorder>,
    session: Session,
}

impl<'a> ModelContext<'a> {
    pub fn new(store: &'a dyn Store, cache: &'a RecordCache, templates: &'a dyn QueryTemplates) -> Self {
        Self {
            store,
            cache,
            catalog: SchemaCatalog::new(store, cache),
            templates,
            registry: ModelRegistry::new(),
            history: None,
            session: Session::default(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_history(mut self, history: &'a dyn HistoryRecorder) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    pub fn cache(&self) -> &'a RecordCache {
        self.cache
    }

    pub fn catalog(&self) -> &SchemaCatalog<'a> {
        &self.catalog
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Creates an empty record for a registered table.
    pub fn record(&self, table: &str) -> Option<Record<'_>> {
        let definition = self.registry.definition(table)?.clone();
        Some(Record::new(self, definition))
    }
}

/// One row of one table, plus pending edits.
pub struct Record<'c> {
    ctx: &'c ModelContext<'c>,
    definition: Rc<ModelDefinition>,
    hooks: Rc<dyn ModelHooks>,
    data: FieldMap,
    change_buffer: FieldMap,
    last_data: FieldMap,
    is_cached: bool,
    last_rows_found: Cell<usize>,
    localisations: OnceCell<Localisations>,
}

impl<'c> Record<'c> {
    pub fn new(ctx: &'c ModelContext<'c>, definition: ModelDefinition) -> Self {
        Self::from_parts(ctx, Rc::new(definition), Rc::new(NoHooks))
    }

    fn from_parts(
        ctx: &'c ModelContext<'c>,
        definition: Rc<ModelDefinition>,
        hooks: Rc<dyn ModelHooks>,
    ) -> Self {
        Self {
            ctx,
            definition,
            hooks,
            data: FieldMap::new(),
            change_buffer: FieldMap::new(),
            last_data: FieldMap::new(),
            is_cached: false,
            last_rows_found: Cell::new(0),
            localisations: OnceCell::new(),
        }
    }

    /// Sibling record sharing this record's definition and hooks.
    fn sibling(&self) -> Record<'c> {
        Self::from_parts(self.ctx, Rc::clone(&self.definition), Rc::clone(&self.hooks))
    }

    pub fn with_hooks(mut self, hooks: Rc<dyn ModelHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Creates a record and loads row `id`.
    pub fn by_id(ctx: &'c ModelContext<'c>, definition: ModelDefinition, id: i64) -> Self {
        let mut record = Self::new(ctx, definition);
        record.load(id);
        record
    }

    /// Creates a record holding row `id` as it was at `at`.
    ///
    /// Non-temporal models ignore `at` and load the current row. Temporal
    /// models ask the history collaborator; an unknown revision leaves the
    /// record invalid.
    pub fn by_revision(
        ctx: &'c ModelContext<'c>,
        definition: ModelDefinition,
        id: i64,
        at: NaiveDateTime,
    ) -> Self {
        let mut record = Self::new(ctx, definition);
        if !record.definition.temporal {
            record.load(id);
            return record;
        }

        let Some(history) = ctx.history else {
            warn!(
                "event=record_revision module=record status=skip table={} id={id} reason=no_history",
                record.definition.table
            );
            return record;
        };
        match history.revision(&record.definition.table, id, at) {
            Ok(Some(snapshot)) => record.replace_data(snapshot),
            Ok(None) => debug!(
                "event=record_revision module=record status=miss table={} id={id}",
                record.definition.table
            ),
            Err(err) => warn!(
                "event=record_revision module=record status=error table={} id={id} error={err}",
                record.definition.table
            ),
        }
        record
    }

    /// Creates a record around an already fetched row.
    pub fn from_data(ctx: &'c ModelContext<'c>, definition: ModelDefinition, data: FieldMap) -> Self {
        let mut record = Self::new(ctx, definition);
        record.load_data(data);
        record
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    pub fn table_name(&self) -> &str {
        &self.definition.table
    }

    pub fn is_temporal(&self) -> bool {
        self.definition.temporal
    }

    pub fn is_cached(&self) -> bool {
        self.is_cached
    }

    /// Loads row `id` unless it is already held from the cache.
    pub fn load(&mut self, id: i64) -> &mut Self {
        if self.is_cached && self.get_id() == id {
            return self;
        }

        let table = self.definition.table.clone();
        if self.definition.cache_on_load {
            if let Some(cached) = self.ctx.cache.get_record_data(&table, id) {
                debug!("event=record_load module=record status=hit source=cache table={table} id={id}");
                self.replace_data(cached);
                self.is_cached = true;
                self.hooks.on_load(self, id);
                return self;
            }
        }

        let row = self.fetch_row(id);
        self.replace_data(row);
        self.is_cached = false;
        if self.definition.cache_on_load && self.is_valid() {
            self.is_cached = self.ctx.cache.set_record_data(&table, &self.data);
        }
        self.hooks.on_load(self, id);
        self
    }

    /// Forces a store round trip for `id`, bypassing cached state.
    fn reload(&mut self, id: i64) {
        self.is_cached = false;
        self.load(id);
    }

    fn fetch_row(&self, id: i64) -> FieldMap {
        let params = template_params([
            ("tableName", self.definition.table.clone()),
            ("id", id.to_string()),
        ]);
        let Some(sql) = self.statement(QueryOperation::GetDetails, &params, &params) else {
            return FieldMap::new();
        };
        match self.ctx.store.query(&sql) {
            Ok(rows) => rows.into_iter().next().unwrap_or_default(),
            Err(err) => {
                warn!(
                    "event=record_load module=record status=error table={} id={id} error={err}",
                    self.definition.table
                );
                FieldMap::new()
            }
        }
    }

    /// Replaces the snapshot with `data` without touching pending changes.
    pub fn load_data(&mut self, data: FieldMap) -> &mut Self {
        self.replace_data(data);
        self
    }

    fn replace_data(&mut self, data: FieldMap) {
        self.data = data;
        self.localisations = OnceCell::new();
    }

    pub fn has(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    /// Pending value if one is buffered, else the persisted value.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.change_buffer
            .get(field)
            .or_else(|| self.data.get(field))
    }

    pub fn get_or(&self, field: &str, default: FieldValue) -> FieldValue {
        self.get(field).cloned().unwrap_or(default)
    }

    /// Buffers a change for a known field; returns whether it was accepted.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> bool {
        if !self.data.contains_key(field) {
            debug!(
                "event=record_set module=record status=skip table={} field={field} reason=unknown_field",
                self.definition.table
            );
            return false;
        }
        if field == I18N_FIELD {
            self.localisations = OnceCell::new();
        }
        self.change_buffer.insert(field.to_string(), value.into());
        true
    }

    /// Drops pending changes; buffered translations go with them.
    pub(crate) fn clear_changes(&mut self) {
        if self.change_buffer.contains_key(I18N_FIELD) {
            self.localisations = OnceCell::new();
        }
        self.change_buffer.clear();
    }

    /// Persisted id, or [`FAILED`] when the record holds no row.
    pub fn get_id(&self) -> i64 {
        self.data
            .get("id")
            .and_then(FieldValue::as_i64)
            .unwrap_or(FAILED)
    }

    pub fn is_valid(&self) -> bool {
        self.data.get("id").is_some_and(|id| !id.is_null())
    }

    /// Current snapshot; cache-on-load models also refresh the cache entry.
    pub fn get_data(&mut self) -> &FieldMap {
        if self.definition.cache_on_load && !self.is_cached && self.is_valid() {
            self.is_cached = self
                .ctx
                .cache
                .set_record_data(&self.definition.table, &self.data);
        }
        &self.data
    }

    pub fn data(&self) -> &FieldMap {
        &self.data
    }

    pub fn pending_changes(&self) -> &FieldMap {
        &self.change_buffer
    }

    /// Snapshot taken right before the most recent mutation.
    pub fn last_data(&self) -> &FieldMap {
        &self.last_data
    }

    /// Rows returned by the most recent generic list query.
    pub fn last_rows_found(&self) -> usize {
        self.last_rows_found.get()
    }

    /// Drops the snapshot; pending changes survive.
    pub fn invalidate(&mut self) -> &mut Self {
        self.replace_data(FieldMap::new());
        self.is_cached = false;
        self
    }

    /// Removes this row's cache entry if the record was served from cache.
    pub fn invalidate_cache(&mut self) {
        if self.is_cached {
            self.ctx
                .cache
                .delete_record_data(&self.definition.table, self.get_id());
            self.is_cached = false;
        }
    }

    pub fn get_metadata(&self) -> Rc<TableSchema> {
        self.ctx.catalog.schema(&self.definition.table)
    }

    pub fn is_localisable(&self) -> bool {
        self.has(I18N_FIELD)
    }

    pub fn is_field_localisable(&self, column: &ColumnDescriptor) -> bool {
        column.kind.is_localisable()
    }

    /// Explicitly configured `i18n_fields` win over the column-type rule.
    pub fn list_localisable_fields(&self) -> Vec<String> {
        let schema = self.get_metadata();
        if !self.definition.i18n_fields.is_empty() {
            return self
                .definition
                .i18n_fields
                .iter()
                .filter(|field| schema.contains_key(field.as_str()))
                .cloned()
                .collect();
        }
        schema
            .values()
            .filter(|column| column.name != I18N_FIELD && self.is_field_localisable(column))
            .map(|column| column.name.clone())
            .collect()
    }

    fn codec(&self) -> ValueCodec {
        ValueCodec::new(self.definition.allow_html)
    }

    /// Renders the statement for `operation`.
    ///
    /// A registered override template wins and receives `custom` params;
    /// otherwise the generic template is rendered with `generic` params.
    fn statement(
        &self,
        operation: QueryOperation,
        generic: &TemplateParams,
        custom: &TemplateParams,
    ) -> Option<String> {
        self.custom_statement(operation, custom)
            .or_else(|| self.generic_statement(operation, generic))
    }

    fn generic_statement(&self, operation: QueryOperation, params: &TemplateParams) -> Option<String> {
        let sql = self
            .ctx
            .templates
            .render(None, operation.template_name(), params);
        if sql.is_none() {
            error!(
                "event=template_render module=record status=error table={} template={} error_code=template_missing",
                self.definition.table,
                operation.template_name()
            );
        }
        sql
    }

    fn custom_statement(&self, operation: QueryOperation, params: &TemplateParams) -> Option<String> {
        let name = self.definition.override_template(operation)?;
        let module = self.definition.module.as_deref();
        let sql = self.ctx.templates.render(module, name, params);
        if sql.is_none() {
            warn!(
                "event=template_render module=record status=error table={} template={name} error_code=override_missing",
                self.definition.table
            );
        }
        sql
    }
}
