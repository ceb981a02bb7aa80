mod common;

use common::{open_fixture_db, products, seed_product, CountingStore};
use recmap_core::{
    field_map, FieldMap, FieldValue, ListOptions, ModelContext, Paging, QueryOperation, Record,
    RecordCache, Store, TemplateSet,
};
use rusqlite::Connection;

fn seeded() -> Connection {
    let conn = open_fixture_db();
    seed_product(&conn, "Lamp", 12.5, "draft");
    seed_product(&conn, "Desk", 80.0, "live");
    seed_product(&conn, "Chair", 45.0, "live");
    seed_product(&conn, "Shelf", 30.0, "live");
    conn
}

fn names(rows: &[FieldMap]) -> Vec<String> {
    rows.iter().map(|row| row["name"].to_text()).collect()
}

fn ids(rows: &[FieldMap]) -> Vec<i64> {
    rows.iter().filter_map(|row| row["id"].as_i64()).collect()
}

#[test]
fn filters_keep_known_fields_only() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let rows = record.get_list(
        &field_map([("status", "live"), ("ghost", "x")]),
        &ListOptions::default(),
    );
    assert_eq!(rows.len(), 3);
    let sql = store.last_statement().unwrap();
    assert_eq!(sql, "SELECT * FROM products WHERE status = 'live'");
}

#[test]
fn null_filters_use_is_null() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let params = field_map([("notes", FieldValue::Null), ("status", "live".into())]);
    let rows = record.get_list(&params, &ListOptions::default());
    assert_eq!(rows.len(), 3);
    assert!(store
        .last_statement()
        .unwrap()
        .contains("WHERE notes IS NULL AND status = 'live'"));
}

#[test]
fn order_and_limit_are_pushed_into_the_statement() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let options = ListOptions {
        limit: Some(2),
        order: Some("price DESC".to_string()),
        ..ListOptions::default()
    };
    let rows = record.get_list(&FieldMap::new(), &options);
    assert_eq!(names(&rows), ["Desk", "Chair"]);
    assert_eq!(record.last_rows_found(), 2);
    assert_eq!(
        store.last_statement().unwrap(),
        "SELECT * FROM products ORDER BY price DESC LIMIT 2"
    );
}

#[test]
fn paging_windows_all_fetched_rows() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let options = ListOptions {
        order: Some("id".to_string()),
        paging: Some(Paging {
            offset: 1,
            limit: Some(2),
        }),
        ..ListOptions::default()
    };
    let rows = record.get_list(&FieldMap::new(), &options);
    assert_eq!(ids(&rows), [2, 3]);
    assert_eq!(record.last_rows_found(), 4);

    let tail = ListOptions {
        order: Some("id".to_string()),
        paging: Some(Paging {
            offset: 3,
            limit: None,
        }),
        ..ListOptions::default()
    };
    assert_eq!(ids(&record.get_list(&FieldMap::new(), &tail)), [4]);
}

#[test]
fn blacklisted_fields_are_removed_from_rows() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let options = ListOptions {
        blacklist: vec!["notes".to_string(), "i18n".to_string()],
        ..ListOptions::default()
    };
    for row in record.get_list(&FieldMap::new(), &options) {
        assert!(!row.contains_key("notes"));
        assert!(!row.contains_key("i18n"));
        assert!(row.contains_key("name"));
    }
}

#[test]
fn join_clause_is_placed_after_the_table() {
    let conn = seeded();
    conn.execute("INSERT INTO orders (code, total) VALUES ('Desk', 80)", [])
        .unwrap();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let options = ListOptions {
        join: Some("INNER JOIN orders ON orders.code = products.name".to_string()),
        ..ListOptions::default()
    };
    let rows = record.get_list(&field_map([("status", "live")]), &options);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["code"], FieldValue::from("Desk"));
}

#[test]
fn search_wraps_rows_in_records() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let found = record.search(&field_map([("status", "draft")]), &ListOptions::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_id(), 1);
    assert_eq!(found[0].table_name(), "products");
    assert_eq!(found[0].get("name"), Some(&FieldValue::from("Lamp")));
}

#[test]
fn get_row_and_exists() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let row = record.get_row(&field_map([("name", "Chair")]));
    assert_eq!(row["id"], FieldValue::Integer(3));
    assert!(record.get_row(&field_map([("name", "Sofa")])).is_empty());

    assert!(record.exists(&field_map([("status", "live")])));
    assert!(!record.exists(&field_map([("status", "gone")])));
    assert!(record.exists(&FieldMap::new()));
}

#[test]
fn select_helpers() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let sorted = record.select(&field_map([("status", "live")]), Some("name"));
    assert_eq!(names(&sorted), ["Chair", "Desk", "Shelf"]);

    let custom = record.select_by_query("SELECT name FROM products WHERE price > 40 ORDER BY name");
    assert_eq!(names(&custom), ["Chair", "Desk"]);

    let by_ids = record.select_by_ids(&[1, 3]);
    assert_eq!(ids(&by_ids), [1, 3]);

    store.reset();
    assert!(record.select_by_ids(&[]).is_empty());
    assert_eq!(store.statement_count(), 0);
}

#[test]
fn random_selection_respects_filters_and_count() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    let mut picked = record.get_random_ids(2, &field_map([("status", "live")]));
    picked.sort_unstable();
    picked.dedup();
    assert_eq!(picked.len(), 2);
    assert!(picked.iter().all(|id| (2..=4).contains(id)));

    assert_eq!(record.select_random(10, &FieldMap::new()).len(), 4);
    assert!(record
        .get_random_ids(3, &field_map([("status", "gone")]))
        .is_empty());
}

#[test]
fn store_failures_read_as_no_rows() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let record = Record::new(&ctx, products());

    assert!(record.select_by_query("SELECT * FROM nowhere").is_empty());
    assert!(store.last_error().contains("nowhere"));
}

#[test]
fn override_templates_replace_generic_statements() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let mut templates = TemplateSet::new();
    templates.register(
        Some("shop"),
        "Product_Search",
        "SELECT * FROM products WHERE name LIKE '%{{name}}%' ORDER BY id",
    );
    templates.register(
        Some("shop"),
        "Product_Details",
        "SELECT id, name FROM products WHERE id = {{id}}",
    );
    let ctx = ModelContext::new(&store, &cache, &templates);
    let definition = products()
        .with_module("shop")
        .with_override(QueryOperation::Search, "Product_Search")
        .with_override(QueryOperation::GetDetails, "Product_Details");
    let record = Record::new(&ctx, definition.clone());

    let rows = record.get_list(&field_map([("name", "a")]), &ListOptions::default());
    assert_eq!(names(&rows), ["Lamp", "Chair"]);
    assert!(record
        .get_list(&field_map([("name", "O'x")]), &ListOptions::default())
        .is_empty());

    let loaded = Record::by_id(&ctx, definition, 2);
    assert_eq!(loaded.data().len(), 2);
    assert_eq!(loaded.get("name"), Some(&FieldValue::from("Desk")));
}

#[test]
fn missing_override_falls_back_to_generic_template() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);
    let definition = products()
        .with_module("shop")
        .with_override(QueryOperation::Search, "Product_Search");
    let record = Record::new(&ctx, definition);

    let rows = record.get_list(&field_map([("status", "live")]), &ListOptions::default());
    assert_eq!(rows.len(), 3);
}

#[test]
fn exists_reads_the_count_column() {
    let conn = seeded();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let mut templates = TemplateSet::new();
    templates.register(
        Some("shop"),
        "Product_Exists",
        "SELECT 0 AS amount, COUNT(*) AS cnt FROM products WHERE status = '{{status}}'",
    );
    let ctx = ModelContext::new(&store, &cache, &templates);
    let definition = products()
        .with_module("shop")
        .with_override(QueryOperation::Exists, "Product_Exists");
    let record = Record::new(&ctx, definition);

    assert!(record.exists(&field_map([("status", "live")])));
    assert!(!record.exists(&field_map([("status", "gone")])));
}
