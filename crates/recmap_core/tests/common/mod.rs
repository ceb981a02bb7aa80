#![allow(dead_code)]

use recmap_core::{
    open_db_in_memory, DescribeRow, FieldMap, ModelDefinition, Session, SqliteStore, Store,
    StoreResult,
};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};

const FIXTURE_SQL: &str = "
CREATE TABLE products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name VARCHAR(64) NOT NULL DEFAULT '',
    price DECIMAL(10,2),
    status VARCHAR(16),
    notes TEXT,
    created DATETIME,
    updated DATETIME,
    editor INT(10),
    i18n TEXT
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code VARCHAR(16) NOT NULL,
    total DECIMAL(10,2),
    created DATETIME,
    updated DATETIME
);
";

/// Migrated in-memory database with the `products` and `orders` tables.
pub fn open_fixture_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(FIXTURE_SQL).unwrap();
    conn
}

pub fn products() -> ModelDefinition {
    ModelDefinition::new("Product", "products")
}

pub fn orders() -> ModelDefinition {
    ModelDefinition::new("Order", "orders")
}

pub fn session() -> Session {
    Session {
        user_id: 42,
        language: "de".to_string(),
    }
}

pub fn seed_product(conn: &Connection, name: &str, price: f64, status: &str) -> i64 {
    conn.execute(
        "INSERT INTO products (name, price, status) VALUES (?1, ?2, ?3);",
        rusqlite::params![name, price, status],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// Store wrapper recording every statement it forwards.
pub struct CountingStore<'conn> {
    inner: SqliteStore<'conn>,
    describes: Cell<usize>,
    statements: RefCell<Vec<String>>,
}

impl<'conn> CountingStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            inner: SqliteStore::new(conn),
            describes: Cell::new(0),
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn describe_count(&self) -> usize {
        self.describes.get()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.borrow().len()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.statements.borrow().last().cloned()
    }

    pub fn reset(&self) {
        self.describes.set(0);
        self.statements.borrow_mut().clear();
    }
}

impl Store for CountingStore<'_> {
    fn describe_table(&self, table: &str) -> StoreResult<Vec<DescribeRow>> {
        self.describes.set(self.describes.get() + 1);
        self.inner.describe_table(table)
    }

    fn query(&self, sql: &str) -> StoreResult<Vec<FieldMap>> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.query(sql)
    }

    fn execute(&self, sql: &str) -> StoreResult<u64> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.execute(sql)
    }

    fn last_insert_id(&self) -> i64 {
        self.inner.last_insert_id()
    }

    fn last_error(&self) -> String {
        self.inner.last_error()
    }
}
