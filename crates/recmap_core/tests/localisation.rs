mod common;

use common::{open_fixture_db, products, seed_product, session, CountingStore};
use recmap_core::{
    field_map, FieldMap, FieldValue, LocalisationDigest, ModelContext, Record, RecordCache,
    TemplateSet, DECODED_I18N_FIELD, FAILED,
};
use rusqlite::Connection;

const TRANSLATIONS: &str =
    r#"{"de":{"name":"Lampe","status":"  "},"fr":{"name":"Lampe","notes":"Fragile","ghost":"x"}}"#;

fn localised_fixture() -> (Connection, i64) {
    let conn = open_fixture_db();
    let id = seed_product(&conn, "Lamp", 12.5, "draft");
    conn.execute(
        "UPDATE products SET i18n = ?1 WHERE id = ?2",
        rusqlite::params![TRANSLATIONS, id],
    )
    .unwrap();
    (conn, id)
}

#[test]
fn current_localisation_follows_the_session_language() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates).with_session(session());

    let record = Record::by_id(&ctx, products(), id);
    assert!(record.is_localisable());
    assert_eq!(record.get_localisations().len(), 2);

    let current = record.get_current_localisation();
    assert_eq!(current["name"], FieldValue::from("Lampe"));
    assert_eq!(current.len(), 2);
}

#[test]
fn translated_data_is_a_read_only_overlay() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);

    let record = Record::by_id(&ctx, products(), id);
    let french = record.translated_data("fr");
    assert_eq!(french["name"], FieldValue::from("Lampe"));
    assert_eq!(french["notes"], FieldValue::from("Fragile"));
    assert_eq!(french["ghost"], FieldValue::from("x"));
    assert_eq!(french[DECODED_I18N_FIELD].as_map().map(|map| map.len()), Some(2));

    assert_eq!(record.data()["name"], FieldValue::from("Lamp"));
    assert!(!record.has(DECODED_I18N_FIELD));
    assert!(!record.has("ghost"));
    let untranslated = record.translated_data("es");
    assert_eq!(untranslated["name"], FieldValue::from("Lamp"));
    assert!(record.pending_changes().is_empty());
}

#[test]
fn digest_splits_translated_and_blank_fields() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);

    let record = Record::by_id(&ctx, products(), id);
    assert_eq!(record.list_localisable_fields(), ["name", "notes", "status"]);

    let digest = record.get_localisation_digest();
    assert_eq!(
        digest,
        vec![
            LocalisationDigest {
                language: "de".to_string(),
                translated: vec!["name".to_string()],
                untranslated: vec!["status".to_string()],
            },
            LocalisationDigest {
                language: "fr".to_string(),
                translated: vec!["ghost".to_string(), "name".to_string(), "notes".to_string()],
                untranslated: Vec::new(),
            },
        ]
    );
}

#[test]
fn pending_translation_changes_are_visible_immediately() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates).with_session(session());

    let mut record = Record::by_id(&ctx, products(), id);
    assert_eq!(record.get_localisations().len(), 2);

    record.set("i18n", r#"{"de":{"name":"Leuchte"}}"#);
    assert_eq!(record.get_localisations().len(), 1);
    assert_eq!(
        record.get_current_localisation()["name"],
        FieldValue::from("Leuchte")
    );
}

#[test]
fn malformed_or_missing_translations_read_as_empty() {
    let conn = open_fixture_db();
    let plain = seed_product(&conn, "Desk", 80.0, "live");
    let broken = seed_product(&conn, "Chair", 45.0, "live");
    conn.execute(
        "UPDATE products SET i18n = '{broken' WHERE id = ?1",
        [broken],
    )
    .unwrap();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates).with_session(session());

    for id in [plain, broken] {
        let record = Record::by_id(&ctx, products(), id);
        assert!(record.get_localisations().is_empty());
        assert!(record.get_current_localisation().is_empty());
        assert!(record.get_localisation_digest().is_empty());
    }
}

#[test]
fn configured_i18n_fields_replace_the_column_rule() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates);

    let definition = products().with_i18n_fields(["notes", "name", "missing"]);
    let record = Record::by_id(&ctx, definition, id);
    assert_eq!(record.list_localisable_fields(), ["notes", "name"]);
}

#[test]
fn failed_commits_discard_buffered_translations() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates).with_session(session());

    let mut record = Record::by_id(&ctx, products(), id);
    record.set("i18n", r#"{"de":{"name":"Leuchte"}}"#);
    assert_eq!(record.get_current_localisation()["name"], FieldValue::from("Leuchte"));

    conn.execute("DELETE FROM products WHERE id = ?1", [id]).unwrap();
    assert_eq!(record.update(FieldMap::new(), false), Ok(FAILED));

    assert!(record.pending_changes().is_empty());
    assert_eq!(record.get_current_localisation()["name"], FieldValue::from("Lampe"));
}

#[test]
fn translations_passed_to_update_reset_the_decoded_map() {
    let (conn, id) = localised_fixture();
    let store = CountingStore::new(&conn);
    let cache = RecordCache::in_memory();
    let templates = TemplateSet::new();
    let ctx = ModelContext::new(&store, &cache, &templates).with_session(session());

    let mut record = Record::by_id(&ctx, products(), id);
    assert_eq!(record.get_localisations().len(), 2);

    let changes = field_map([("i18n", r#"{"de":{"name":"Leuchte"}}"#)]);
    assert_eq!(record.update(changes, false), Ok(id));
    assert_eq!(record.get_localisations().len(), 1);
    assert_eq!(record.get_current_localisation()["name"], FieldValue::from("Leuchte"));
}
