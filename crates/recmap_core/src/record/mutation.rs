//! Insert, update and delete for [`Record`].
//!
//! # Invariants
//! - A denied access check returns [`FAILED`] before any store statement.
//! - Successful mutations drop the row's cache entry.
//! - Hooks run before the change buffer is cleared.

use super::{AccessAction, Record, RecordError, RecordResult, FAILED, I18N_FIELD};
use crate::codec::Literal;
use crate::model::column::TableSchema;
use crate::model::definition::QueryOperation;
use crate::model::value::{FieldMap, FieldValue};
use crate::store::HistoryOperation;
use crate::template::template_params;
use chrono::{SubsecRound, Utc};
use log::{debug, info, warn};
use once_cell::unsync::OnceCell;
use std::time::Instant;

impl<'c> Record<'c> {
    /// Persists pending changes (plus `changes`) to the loaded row.
    ///
    /// Returns the row id on success, [`FAILED`] when access is denied, no
    /// row is loaded or the store changed nothing.
    pub fn update(&mut self, changes: FieldMap, ignore_previous_changes: bool) -> RecordResult<i64> {
        if !self.hooks.check_access(self, AccessAction::Update) {
            self.log_denied("record_update");
            return Ok(FAILED);
        }
        self.absorb_changes(changes, ignore_previous_changes)?;

        if !self.is_valid() {
            warn!(
                "event=record_update module=record status=error table={} error_code=not_loaded",
                self.definition.table
            );
            return Ok(FAILED);
        }
        let id = self.get_id();
        if let Some(supplied) = self.change_buffer.get("id") {
            if supplied.as_i64() != Some(id) {
                return Err(RecordError::ConflictingId {
                    loaded: id,
                    supplied: supplied.clone(),
                });
            }
        }

        let started_at = Instant::now();
        let schema = self.get_metadata();
        let now = current_timestamp();
        if schema.contains_key("updated") && !self.change_buffer.contains_key("updated") {
            self.change_buffer.insert("updated".to_string(), now);
        }
        self.fill_editor(&schema);

        let codec = self.codec();
        let mut assignments = Vec::new();
        let mut delta = FieldMap::new();
        for (field, value) in &self.change_buffer {
            if field == "id" || field == "created" {
                continue;
            }
            let Some(column) = schema.get(field) else {
                debug!(
                    "event=record_update module=record status=skip table={} field={field} reason=unknown_field",
                    self.definition.table
                );
                continue;
            };
            let literal = codec.encode(value, column);
            assignments.push(format!("{field} = {literal}"));
            delta.insert(field.clone(), literal.to_value());
        }
        if assignments.is_empty() {
            debug!(
                "event=record_update module=record status=skip table={} id={id} reason=nothing_to_write",
                self.definition.table
            );
            return Ok(FAILED);
        }

        let generic = template_params([
            ("tableName", self.definition.table.clone()),
            ("fields", assignments.join(", ")),
            ("id", id.to_string()),
        ]);
        let Some(sql) = self.statement(QueryOperation::Update, &generic, &generic) else {
            return Ok(FAILED);
        };

        let snapshot = self.data.clone();
        if self.run_write(&sql, "record_update") == 0 {
            self.clear_changes();
            return Ok(FAILED);
        }

        self.last_data = snapshot;
        let mut merged = self.data.clone();
        merged.extend(delta.clone());
        self.replace_data(merged);
        self.drop_cache_entry(id);
        if self.definition.temporal {
            self.reload(id);
            self.record_history(HistoryOperation::Update, id, &delta);
        }
        self.hooks.on_update(self, id);
        self.clear_changes();

        info!(
            "event=record_update module=record status=ok table={} id={id} fields={} duration_ms={}",
            self.definition.table,
            delta.len(),
            started_at.elapsed().as_millis()
        );
        Ok(id)
    }

    /// Inserts pending changes (plus `changes`) as a new row and loads it.
    ///
    /// Returns the new id, or [`FAILED`].
    pub fn insert(&mut self, changes: FieldMap, ignore_previous_changes: bool) -> RecordResult<i64> {
        if !self.hooks.check_access(self, AccessAction::Insert) {
            self.log_denied("record_insert");
            return Ok(FAILED);
        }
        self.absorb_changes(changes, ignore_previous_changes)?;
        if !self.definition.allow_insertion_id {
            self.change_buffer.remove("id");
        }

        let started_at = Instant::now();
        let schema = self.get_metadata();
        if schema.is_empty() {
            warn!(
                "event=record_insert module=record status=error table={} error_code=schema_unavailable",
                self.definition.table
            );
            return Ok(FAILED);
        }
        let now = current_timestamp();
        for field in ["created", "updated"] {
            if schema.contains_key(field) {
                self.change_buffer.insert(field.to_string(), now.clone());
            }
        }
        self.fill_editor(&schema);

        let codec = self.codec();
        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut delta = FieldMap::new();
        for (field, value) in &self.change_buffer {
            let Some(column) = schema.get(field) else {
                debug!(
                    "event=record_insert module=record status=skip table={} field={field} reason=unknown_field",
                    self.definition.table
                );
                continue;
            };
            let literal: Literal = codec.encode(value, column);
            names.push(field.clone());
            values.push(literal.to_string());
            delta.insert(field.clone(), literal.to_value());
        }

        let generic = template_params([
            ("tableName", self.definition.table.clone()),
            ("fields", names.join(", ")),
            ("values", values.join(", ")),
        ]);
        self.last_data = FieldMap::new();
        let Some(sql) = self.statement(QueryOperation::Insert, &generic, &generic) else {
            return Ok(FAILED);
        };

        let id = if self.run_write(&sql, "record_insert") > 0 {
            self.ctx.store.last_insert_id()
        } else {
            FAILED
        };
        if id <= 0 {
            self.clear_changes();
            return Ok(FAILED);
        }

        self.drop_cache_entry(id);
        self.reload(id);
        if self.definition.temporal {
            self.record_history(HistoryOperation::Insert, id, &delta);
        }
        self.hooks.on_insert(self, id);
        self.clear_changes();

        info!(
            "event=record_insert module=record status=ok table={} id={id} duration_ms={}",
            self.definition.table,
            started_at.elapsed().as_millis()
        );
        Ok(id)
    }

    /// Deletes row `id`, or the loaded row when `id` is `None`.
    ///
    /// Returns the deleted id, or [`FAILED`].
    pub fn delete(&mut self, id: Option<i64>) -> i64 {
        if !self.hooks.check_access(self, AccessAction::Delete) {
            self.log_denied("record_delete");
            return FAILED;
        }
        let Some(id) = id.or_else(|| self.get("id").and_then(FieldValue::as_i64)) else {
            warn!(
                "event=record_delete module=record status=error table={} error_code=missing_id",
                self.definition.table
            );
            return FAILED;
        };

        self.last_data = self.data.clone();
        let params = template_params([
            ("tableName", self.definition.table.clone()),
            ("id", id.to_string()),
        ]);
        let Some(sql) = self.statement(QueryOperation::Delete, &params, &params) else {
            return FAILED;
        };
        if self.run_write(&sql, "record_delete") == 0 {
            return FAILED;
        }

        self.drop_cache_entry(id);
        if self.definition.temporal {
            self.record_history(HistoryOperation::Delete, id, &FieldMap::new());
        }
        self.hooks.on_delete(self, id);
        info!(
            "event=record_delete module=record status=ok table={} id={id}",
            self.definition.table
        );
        id
    }

    /// Inserts a copy of this record's data as a new row.
    pub fn copy(&self) -> RecordResult<Record<'c>> {
        let mut copy = self.sibling();
        copy.insert(self.data.clone(), false)?;
        Ok(copy)
    }

    fn absorb_changes(&mut self, changes: FieldMap, ignore_previous_changes: bool) -> RecordResult<()> {
        if ignore_previous_changes {
            if changes.is_empty() {
                return Err(RecordError::EmptyReplacement);
            }
            self.clear_changes();
        }
        if changes.contains_key(I18N_FIELD) {
            self.localisations = OnceCell::new();
        }
        self.change_buffer.extend(changes);
        Ok(())
    }

    fn fill_editor(&mut self, schema: &TableSchema) {
        if self.definition.trackable
            && schema.contains_key("editor")
            && !self.change_buffer.contains_key("editor")
        {
            self.change_buffer.insert(
                "editor".to_string(),
                FieldValue::Integer(self.ctx.session.user_id),
            );
        }
    }

    /// Runs one write statement; failures count as zero affected rows.
    fn run_write(&self, sql: &str, event: &str) -> u64 {
        match self.ctx.store.execute(sql) {
            Ok(affected) => affected,
            Err(err) => {
                warn!(
                    "event={event} module=record status=error table={} error={err}",
                    self.definition.table
                );
                0
            }
        }
    }

    fn drop_cache_entry(&mut self, id: i64) {
        self.ctx
            .cache
            .delete_record_data(&self.definition.table, id);
        self.is_cached = false;
    }

    fn record_history(&self, operation: HistoryOperation, id: i64, delta: &FieldMap) {
        let Some(history) = self.ctx.history else {
            debug!(
                "event=record_history module=record status=skip table={} id={id} reason=no_history",
                self.definition.table
            );
            return;
        };
        let snapshot = match operation {
            HistoryOperation::Delete => FieldMap::new(),
            _ => self.data.clone(),
        };
        if let Err(err) = history.save(&self.definition.table, id, operation, delta, &snapshot) {
            warn!(
                "event=record_history module=record status=error table={} id={id} operation={} error={err}",
                self.definition.table,
                operation.as_str()
            );
        }
    }

    fn log_denied(&self, event: &str) {
        info!(
            "event={event} module=record status=denied table={}",
            self.definition.table
        );
    }
}

fn current_timestamp() -> FieldValue {
    FieldValue::DateTime(Utc::now().naive_utc().trunc_subsecs(0))
}
