//! Model definitions and the table -> model registry.
//!
//! # Responsibility
//! - Describe how one model binds to its table (flags, module scope).
//! - Resolve per-model override templates through an explicit lookup table.
//! - Persist the registry under the `settings:modelMapping` cache key.
//!
//! # Invariants
//! - Override lookups are pure: no name construction at call time.
//! - Later registrations for the same table replace earlier ones.

use crate::cache::RecordCache;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cache key holding the serialized registry.
pub const MODEL_MAPPING_KEY: &str = "settings:modelMapping";

/// Statement kinds that a model may override with a custom template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueryOperation {
    GetDetails,
    Search,
    Insert,
    Update,
    Delete,
    Exists,
    GetRandomIds,
}

impl QueryOperation {
    /// Name of the generic template implementing this operation.
    pub fn template_name(self) -> &'static str {
        match self {
            Self::GetDetails => "GetDetails",
            Self::Search => "Search",
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Exists => "Exists",
            Self::GetRandomIds => "GetRandomIds",
        }
    }
}

/// Binding of one model to its table plus behavior flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub module: Option<String>,
    /// Mutations are mirrored into the history collaborator.
    #[serde(default)]
    pub temporal: bool,
    /// Loaded rows are written to and read from the record cache.
    #[serde(default)]
    pub cache_on_load: bool,
    /// Skip markup stripping for quoted values.
    #[serde(default)]
    pub allow_html: bool,
    /// Populate the `editor` column from the session user.
    #[serde(default = "default_true")]
    pub trackable: bool,
    /// Keep a caller-supplied `id` on insert.
    #[serde(default)]
    pub allow_insertion_id: bool,
    #[serde(default)]
    pub i18n_fields: Vec<String>,
    #[serde(default)]
    pub overrides: BTreeMap<QueryOperation, String>,
}

fn default_true() -> bool {
    true
}

impl ModelDefinition {
    /// Creates a definition with default flags.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            module: None,
            temporal: false,
            cache_on_load: false,
            allow_html: false,
            trackable: true,
            allow_insertion_id: false,
            i18n_fields: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_temporal(mut self, temporal: bool) -> Self {
        self.temporal = temporal;
        self
    }

    pub fn with_cache_on_load(mut self, cache_on_load: bool) -> Self {
        self.cache_on_load = cache_on_load;
        self
    }

    pub fn with_allow_html(mut self, allow_html: bool) -> Self {
        self.allow_html = allow_html;
        self
    }

    pub fn with_trackable(mut self, trackable: bool) -> Self {
        self.trackable = trackable;
        self
    }

    pub fn with_allow_insertion_id(mut self, allow_insertion_id: bool) -> Self {
        self.allow_insertion_id = allow_insertion_id;
        self
    }

    pub fn with_i18n_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.i18n_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Registers a custom template name for one operation.
    pub fn with_override(mut self, operation: QueryOperation, template: impl Into<String>) -> Self {
        self.overrides.insert(operation, template.into());
        self
    }

    pub fn override_template(&self, operation: QueryOperation) -> Option<&str> {
        self.overrides.get(&operation).map(String::as_str)
    }
}

/// Table name -> model definition lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDefinition>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the registry from cache, or builds it and caches the result.
    pub fn load_or_build<F>(cache: &RecordCache, build: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        if let Some(registry) = cache.get_json::<Self>(MODEL_MAPPING_KEY) {
            debug!(
                "event=model_mapping_load module=model status=hit models={}",
                registry.len()
            );
            return registry;
        }

        let registry = build();
        registry.store(cache);
        info!(
            "event=model_mapping_load module=model status=ok source=build models={}",
            registry.len()
        );
        registry
    }

    /// Writes the registry to the cache under [`MODEL_MAPPING_KEY`].
    pub fn store(&self, cache: &RecordCache) {
        cache.set_json(MODEL_MAPPING_KEY, self);
    }

    pub fn register(&mut self, definition: ModelDefinition) {
        self.models.insert(definition.table.clone(), definition);
    }

    pub fn definition(&self, table: &str) -> Option<&ModelDefinition> {
        self.models.get(table)
    }

    /// Returns the override template registered for `(table, operation)`.
    pub fn override_template(&self, table: &str, operation: QueryOperation) -> Option<&str> {
        self.models
            .get(table)
            .and_then(|definition| definition.override_template(operation))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelDefinition, ModelRegistry, QueryOperation};

    #[test]
    fn override_lookup_is_per_table_and_operation() {
        let mut registry = ModelRegistry::new();
        registry.register(
            ModelDefinition::new("Product", "products")
                .with_module("shop")
                .with_override(QueryOperation::Search, "Product_Search"),
        );
        registry.register(ModelDefinition::new("Order", "orders"));

        assert_eq!(
            registry.override_template("products", QueryOperation::Search),
            Some("Product_Search")
        );
        assert_eq!(registry.override_template("products", QueryOperation::Exists), None);
        assert_eq!(registry.override_template("orders", QueryOperation::Search), None);
        assert_eq!(registry.override_template("missing", QueryOperation::Search), None);
    }

    #[test]
    fn missing_flags_take_defaults_when_deserialized() {
        let registry: ModelRegistry =
            serde_json::from_str(r#"{"orders":{"name":"Order","table":"orders"}}"#).unwrap();
        let definition = registry.definition("orders").unwrap();
        assert!(definition.trackable);
        assert!(!definition.temporal);
        assert!(definition.module.is_none());
    }
}
