//! Filtered reads for [`Record`].
//!
//! # Responsibility
//! - Turn equality filters into `WHERE` clauses using the table schema.
//! - Run list, existence, id and random-sample queries.
//!
//! # Invariants
//! - Filter fields unknown to the schema are dropped.
//! - Store failures read as "no rows"; they are logged, never raised.
//! - Override templates receive raw filter values with quotes doubled.

use super::Record;
use crate::codec::ValueCodec;
use crate::model::column::TableSchema;
use crate::model::definition::QueryOperation;
use crate::model::value::{FieldMap, FieldValue};
use crate::template::{template_params, TemplateParams};
use log::{debug, warn};
use std::time::Instant;

/// Column the `Exists` statement reports its count in.
const COUNT_COLUMN: &str = "cnt";

/// Client-side window applied to fetched rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    /// Rows to skip.
    pub offset: usize,
    /// Rows to keep after skipping; `None` keeps the rest.
    pub limit: Option<usize>,
}

/// Options for [`Record::get_list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// `LIMIT` pushed into the statement.
    pub limit: Option<u32>,
    /// Raw `ORDER BY` expression.
    pub order: Option<String>,
    /// Raw join clause placed after the table name.
    pub join: Option<String>,
    pub paging: Option<Paging>,
    /// Fields removed from every returned row.
    pub blacklist: Vec<String>,
}

/// Builds one condition per known filter field.
///
/// `NULL` values become `field IS NULL`; everything else is encoded for
/// its column and compared with `=`.
pub fn build_filter(params: &FieldMap, schema: &TableSchema, codec: ValueCodec) -> Vec<String> {
    params
        .iter()
        .filter_map(|(field, value)| {
            let column = schema.get(field)?;
            if value.is_null() {
                return Some(format!("{field} IS NULL"));
            }
            Some(format!("{field} = {}", codec.encode_sql(value, column)))
        })
        .collect()
}

/// Joins conditions into a `WHERE` clause; empty when there are none.
pub fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

impl<'c> Record<'c> {
    /// Rows of this table matching `params`.
    pub fn get_list(&self, params: &FieldMap, options: &ListOptions) -> Vec<FieldMap> {
        let started_at = Instant::now();
        let sql = match self.custom_statement(QueryOperation::Search, &override_params(params)) {
            Some(sql) => sql,
            None => {
                let conditions = self.filter(params);
                let generic = template_params([
                    ("tableName", self.definition.table.clone()),
                    ("joinClause", options.join.clone().unwrap_or_default()),
                    ("whereClause", where_clause(&conditions)),
                    ("orderClause", order_clause(options.order.as_deref())),
                    (
                        "limitClause",
                        options
                            .limit
                            .map(|limit| format!("LIMIT {limit}"))
                            .unwrap_or_default(),
                    ),
                ]);
                match self.generic_statement(QueryOperation::Search, &generic) {
                    Some(sql) => sql,
                    None => return Vec::new(),
                }
            }
        };

        let rows = self.run_query(&sql, "record_list");
        self.last_rows_found.set(rows.len());
        let window = options.paging.unwrap_or_default();
        let rows: Vec<FieldMap> = rows
            .into_iter()
            .skip(window.offset)
            .take(window.limit.unwrap_or(usize::MAX))
            .map(|mut row| {
                for field in &options.blacklist {
                    row.remove(field);
                }
                row
            })
            .collect();

        debug!(
            "event=record_list module=record status=ok table={} rows_found={} rows_returned={} duration_ms={}",
            self.definition.table,
            self.last_rows_found.get(),
            rows.len(),
            started_at.elapsed().as_millis()
        );
        rows
    }

    /// Matching rows wrapped as records of the same model.
    pub fn search(&self, params: &FieldMap, options: &ListOptions) -> Vec<Record<'c>> {
        self.get_list(params, options)
            .into_iter()
            .map(|row| {
                let mut record = self.sibling();
                record.load_data(row);
                record
            })
            .collect()
    }

    /// First matching row, or an empty map.
    pub fn get_row(&self, params: &FieldMap) -> FieldMap {
        let options = ListOptions {
            limit: Some(1),
            ..ListOptions::default()
        };
        self.get_list(params, &options)
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Whether at least one row matches `params`.
    ///
    /// Reads the `cnt` column, or the row's only column when `cnt` is absent.
    pub fn exists(&self, params: &FieldMap) -> bool {
        let sql = match self.custom_statement(QueryOperation::Exists, &override_params(params)) {
            Some(sql) => sql,
            None => {
                let generic = template_params([
                    ("tableName", self.definition.table.clone()),
                    ("whereClause", where_clause(&self.filter(params))),
                ]);
                match self.generic_statement(QueryOperation::Exists, &generic) {
                    Some(sql) => sql,
                    None => return false,
                }
            }
        };
        self.run_query(&sql, "record_exists")
            .first()
            .and_then(|row| match row.get(COUNT_COLUMN) {
                Some(count) => Some(count),
                None if row.len() == 1 => row.values().next(),
                None => None,
            })
            .and_then(FieldValue::as_i64)
            .is_some_and(|count| count > 0)
    }

    /// Matching rows, optionally ordered by a raw `ORDER BY` expression.
    pub fn select(&self, params: &FieldMap, sort: Option<&str>) -> Vec<FieldMap> {
        let options = ListOptions {
            order: sort.map(str::to_string),
            ..ListOptions::default()
        };
        self.get_list(params, &options)
    }

    /// Runs a literal query and returns its rows.
    pub fn select_by_query(&self, sql: &str) -> Vec<FieldMap> {
        self.run_query(sql, "record_select")
    }

    /// Rows whose id is in `ids`; no statement runs for an empty slice.
    pub fn select_by_ids(&self, ids: &[i64]) -> Vec<FieldMap> {
        if ids.is_empty() {
            return Vec::new();
        }
        let list = ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let generic = template_params([
            ("tableName", self.definition.table.clone()),
            ("whereClause", format!("WHERE id IN ({list})")),
        ]);
        match self.generic_statement(QueryOperation::Search, &generic) {
            Some(sql) => self.run_query(&sql, "record_select"),
            None => Vec::new(),
        }
    }

    /// Up to `count` random ids of rows matching `params`.
    pub fn get_random_ids(&self, count: usize, params: &FieldMap) -> Vec<i64> {
        let mut custom = override_params(params);
        custom.insert("recordCount".to_string(), count.to_string());
        let sql = match self.custom_statement(QueryOperation::GetRandomIds, &custom) {
            Some(sql) => sql,
            None => {
                let generic = template_params([
                    ("tableName", self.definition.table.clone()),
                    ("whereClause", where_clause(&self.filter(params))),
                    ("recordCount", count.to_string()),
                ]);
                match self.generic_statement(QueryOperation::GetRandomIds, &generic) {
                    Some(sql) => sql,
                    None => return Vec::new(),
                }
            }
        };
        self.run_query(&sql, "record_random_ids")
            .iter()
            .filter_map(|row| row.get("id").and_then(FieldValue::as_i64))
            .collect()
    }

    /// Up to `count` random rows matching `params`.
    pub fn select_random(&self, count: usize, params: &FieldMap) -> Vec<FieldMap> {
        let ids = self.get_random_ids(count, params);
        self.select_by_ids(&ids)
    }

    fn filter(&self, params: &FieldMap) -> Vec<String> {
        build_filter(params, &self.get_metadata(), self.codec())
    }

    fn run_query(&self, sql: &str, event: &str) -> Vec<FieldMap> {
        match self.ctx.store.query(sql) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    "event={event} module=record status=error table={} error={err}",
                    self.definition.table
                );
                Vec::new()
            }
        }
    }
}

fn order_clause(order: Option<&str>) -> String {
    match order.map(str::trim) {
        Some(order) if !order.is_empty() => format!("ORDER BY {order}"),
        _ => String::new(),
    }
}

fn override_params(params: &FieldMap) -> TemplateParams {
    params
        .iter()
        .map(|(field, value)| (field.clone(), value.to_text().replace('\'', "''")))
        .collect()
}
