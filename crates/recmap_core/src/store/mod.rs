//! Relational store and history collaborator contracts.
//!
//! # Responsibility
//! - Define the narrow interface records use to reach the relational store.
//! - Define the history collaborator used by temporal models.
//! - Ship SQLite-backed reference implementations of both.
//!
//! # Invariants
//! - Store failures are returned as `StoreError` and mirrored into
//!   `last_error()`; callers above this layer turn them into sentinels.

mod history;
mod sqlite;

pub use history::{HistoryOperation, HistoryRecorder, SqliteHistory};
pub use sqlite::SqliteStore;

use crate::model::value::FieldMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by store and history collaborators.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid store data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// One column as reported by table introspection, in `DESCRIBE` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeRow {
    pub field: String,
    /// Raw declaration such as `int(10) unsigned`.
    pub type_decl: String,
    pub nullable: bool,
    /// `PRI`, `UNI`, `MUL` or empty.
    pub key: String,
    pub default: Option<String>,
    /// `auto_increment` or empty.
    pub extra: String,
}

/// Relational store used by records.
pub trait Store {
    fn describe_table(&self, table: &str) -> StoreResult<Vec<DescribeRow>>;
    fn query(&self, sql: &str) -> StoreResult<Vec<FieldMap>>;
    /// Runs a statement and returns the number of affected rows.
    fn execute(&self, sql: &str) -> StoreResult<u64>;
    fn last_insert_id(&self) -> i64;
    /// Text of the most recent failure, empty after a successful call.
    fn last_error(&self) -> String;
}
