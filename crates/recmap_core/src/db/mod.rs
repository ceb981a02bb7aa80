//! SQLite bootstrap for the reference store adapter and history table.
//!
//! Application tables belong to the caller. This module only configures
//! the connection and owns `record_history`, the snapshot log written by
//! temporal models through [`crate::SqliteHistory`].
//!
//! # Invariants
//! - `record_history` versions are tracked via `PRAGMA user_version`.
//! - A database newer than the supported history schema is rejected.
//! - An up-to-date database whose `record_history` table was dropped is
//!   rejected rather than silently losing revisions.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failures while preparing a connection for records and history.
#[derive(Debug)]
pub enum DbError {
    /// The database could not be opened (`target` is `memory` or the path).
    Open {
        target: String,
        source: rusqlite::Error,
    },
    /// A pragma or version query failed on an open connection.
    Sqlite(rusqlite::Error),
    /// One history migration failed; nothing from the batch was committed.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// `user_version` claims the history schema but the table is gone.
    MissingHistoryTable { db_version: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { target, source } => write!(f, "cannot open database {target}: {source}"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration { version, source } => {
                write!(f, "history migration {version} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "history schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MissingHistoryTable { db_version } => write!(
                f,
                "history schema version {db_version} is recorded but record_history is missing"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. } | Self::Migration { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::MissingHistoryTable { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
