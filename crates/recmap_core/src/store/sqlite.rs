//! SQLite implementation of [`Store`].
//!
//! # Responsibility
//! - Run literal statements on a borrowed connection.
//! - Synthesize `DESCRIBE`-shaped rows from SQLite pragmas.
//!
//! # Invariants
//! - Every call resets or records `last_error`.
//! - Integer primary keys report `auto_increment` (they alias `rowid`).

use super::{DescribeRow, Store, StoreResult};
use crate::model::value::{FieldMap, FieldValue};
use log::warn;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Store adapter over one SQLite connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
    last_error: RefCell<String>,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            last_error: RefCell::new(String::new()),
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn track<T>(&self, operation: &str, result: StoreResult<T>) -> StoreResult<T> {
        match &result {
            Ok(_) => self.last_error.borrow_mut().clear(),
            Err(err) => {
                warn!("event=store_call module=store status=error operation={operation} error={err}");
                *self.last_error.borrow_mut() = err.to_string();
            }
        }
        result
    }

    fn describe_inner(&self, table: &str) -> StoreResult<Vec<DescribeRow>> {
        let quoted = quote_identifier(table);
        let keys = self.index_keys(&quoted)?;

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({quoted});"))?;
        let mut rows = stmt.query([])?;
        let mut described = Vec::new();
        while let Some(row) = rows.next()? {
            let field: String = row.get("name")?;
            let type_decl: String = row.get::<_, String>("type")?.to_ascii_lowercase();
            let not_null: bool = row.get::<_, i64>("notnull")? != 0;
            let pk_position: i64 = row.get("pk")?;
            let default: Option<String> = row.get("dflt_value")?;

            let is_pk = pk_position > 0;
            let key = if is_pk {
                "PRI".to_string()
            } else {
                keys.get(&field).cloned().unwrap_or_default()
            };
            let extra = if is_pk && type_decl.starts_with("int") {
                "auto_increment".to_string()
            } else {
                String::new()
            };

            described.push(DescribeRow {
                field,
                type_decl,
                nullable: !not_null && !is_pk,
                key,
                default,
                extra,
            });
        }
        Ok(described)
    }

    /// Maps single-column indexes to `UNI` / `MUL` markers.
    fn index_keys(&self, quoted_table: &str) -> StoreResult<BTreeMap<String, String>> {
        let mut indexes = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA index_list({quoted_table});"))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get("name")?;
                let unique: bool = row.get::<_, i64>("unique")? != 0;
                let origin: String = row.get("origin")?;
                if origin != "pk" {
                    indexes.push((name, unique));
                }
            }
        }

        let mut keys = BTreeMap::new();
        for (index_name, unique) in indexes {
            let mut stmt = self.conn.prepare(&format!(
                "PRAGMA index_info({});",
                quote_identifier(&index_name)
            ))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, Option<String>>("name"))?
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(Some(first)) = columns.first() {
                let marker = if unique && columns.len() == 1 {
                    "UNI"
                } else {
                    "MUL"
                };
                let entry = keys.entry(first.clone()).or_insert_with(String::new);
                if entry.as_str() != "UNI" {
                    *entry = marker.to_string();
                }
            }
        }
        Ok(keys)
    }

    fn query_inner(&self, sql: &str) -> StoreResult<Vec<FieldMap>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            output.push(row_to_map(row, &names)?);
        }
        Ok(output)
    }
}

impl Store for SqliteStore<'_> {
    fn describe_table(&self, table: &str) -> StoreResult<Vec<DescribeRow>> {
        let result = self.describe_inner(table);
        self.track("describe_table", result)
    }

    fn query(&self, sql: &str) -> StoreResult<Vec<FieldMap>> {
        let result = self.query_inner(sql);
        self.track("query", result)
    }

    fn execute(&self, sql: &str) -> StoreResult<u64> {
        let result = self
            .conn
            .execute(sql, [])
            .map(|changed| changed as u64)
            .map_err(Into::into);
        self.track("execute", result)
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn last_error(&self) -> String {
        self.last_error.borrow().clone()
    }
}

fn row_to_map(row: &Row<'_>, names: &[String]) -> rusqlite::Result<FieldMap> {
    let mut map = FieldMap::new();
    for (index, name) in names.iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(value) => FieldValue::Integer(value),
            ValueRef::Real(value) => FieldValue::Float(value),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                FieldValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        };
        map.insert(name.clone(), value);
    }
    Ok(map)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
