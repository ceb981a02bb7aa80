//! History snapshots for temporal models.
//!
//! # Responsibility
//! - Record one snapshot per successful mutation of a temporal model.
//! - Answer point-in-time lookups for `Record::by_revision`.
//!
//! # Invariants
//! - Snapshots are append-only; nothing here updates or deletes history.
//! - A delete entry hides older snapshots from revision lookups after it.

use super::{StoreError, StoreResult};
use crate::model::value::{FieldMap, DATETIME_FORMAT};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Mutation kind recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOperation {
    Insert,
    Update,
    Delete,
}

impl HistoryOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Collaborator receiving snapshots of temporal models.
pub trait HistoryRecorder {
    fn save(
        &self,
        table: &str,
        id: i64,
        operation: HistoryOperation,
        delta: &FieldMap,
        snapshot: &FieldMap,
    ) -> StoreResult<()>;

    /// Snapshot of `table`/`id` as it was at `at`, if known.
    fn revision(&self, _table: &str, _id: i64, _at: NaiveDateTime) -> StoreResult<Option<FieldMap>> {
        Ok(None)
    }
}

/// History kept in the `record_history` table of a migrated connection.
pub struct SqliteHistory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHistory<'conn> {
    /// Wraps a connection opened through [`crate::db::open_db`] or
    /// [`crate::db::open_db_in_memory`].
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Number of entries recorded for one row.
    pub fn entry_count(&self, table: &str, id: i64) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM record_history WHERE table_name = ?1 AND record_id = ?2;",
            params![table, id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl HistoryRecorder for SqliteHistory<'_> {
    fn save(
        &self,
        table: &str,
        id: i64,
        operation: HistoryOperation,
        delta: &FieldMap,
        snapshot: &FieldMap,
    ) -> StoreResult<()> {
        let recorded_at = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        self.conn.execute(
            "INSERT INTO record_history (
                table_name,
                record_id,
                operation,
                delta,
                snapshot,
                recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                table,
                id,
                operation.as_str(),
                serde_json::to_string(delta)?,
                serde_json::to_string(snapshot)?,
                recorded_at,
            ],
        )?;
        Ok(())
    }

    fn revision(&self, table: &str, id: i64, at: NaiveDateTime) -> StoreResult<Option<FieldMap>> {
        // Fractional digits sort after the bare second, so compare against
        // the end of that second.
        let bound = format!("{}.999999", at.format(DATETIME_FORMAT));
        let latest: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT operation, snapshot
                 FROM record_history
                 WHERE table_name = ?1
                   AND record_id = ?2
                   AND recorded_at <= ?3
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1;",
                params![table, id, bound],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match latest {
            Some((operation, _)) if operation == HistoryOperation::Delete.as_str() => Ok(None),
            Some((_, snapshot)) => serde_json::from_str(&snapshot)
                .map(Some)
                .map_err(StoreError::from),
            None => Ok(None),
        }
    }
}
