//! Query template resolution.
//!
//! # Responsibility
//! - Define the resolver contract that turns a template name plus
//!   parameters into literal statement text.
//! - Provide [`TemplateSet`], holding the generic single-table templates and
//!   module-scoped custom templates.
//!
//! # Invariants
//! - Generic templates live outside any module scope.
//! - Parameters are substituted verbatim; values must already be encoded.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Placeholder name -> substituted text.
pub type TemplateParams = BTreeMap<String, String>;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex"));

const GET_DETAILS_SQL: &str = "SELECT * FROM {{tableName}} WHERE id = {{id}}";
const SEARCH_SQL: &str =
    "SELECT * FROM {{tableName}} {{joinClause}} {{whereClause}} {{orderClause}} {{limitClause}}";
const INSERT_SQL: &str = "INSERT INTO {{tableName}} ({{fields}}) VALUES ({{values}})";
const UPDATE_SQL: &str = "UPDATE {{tableName}} SET {{fields}} WHERE id = {{id}}";
const DELETE_SQL: &str = "DELETE FROM {{tableName}} WHERE id = {{id}}";
const EXISTS_SQL: &str = "SELECT COUNT(*) AS cnt FROM {{tableName}} {{whereClause}}";
const RANDOM_IDS_SQL: &str =
    "SELECT id FROM {{tableName}} {{whereClause}} ORDER BY {{randomFunction}} LIMIT {{recordCount}}";

/// Resolver of named statement templates.
pub trait QueryTemplates {
    /// Renders `name` in `module` scope (`None` = generic templates).
    ///
    /// Returns `None` when no such template exists.
    fn render(&self, module: Option<&str>, name: &str, params: &TemplateParams) -> Option<String>;
}

/// Generic templates plus custom per-module templates.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: BTreeMap<(Option<String>, String), String>,
    random_function: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateSet {
    /// Creates a set holding the generic templates, using SQLite's `RANDOM()`.
    pub fn new() -> Self {
        let mut set = Self {
            templates: BTreeMap::new(),
            random_function: "RANDOM()".to_string(),
        };
        for (name, text) in [
            ("GetDetails", GET_DETAILS_SQL),
            ("Search", SEARCH_SQL),
            ("Insert", INSERT_SQL),
            ("Update", UPDATE_SQL),
            ("Delete", DELETE_SQL),
            ("Exists", EXISTS_SQL),
            ("GetRandomIds", RANDOM_IDS_SQL),
        ] {
            set.templates
                .insert((None, name.to_string()), text.to_string());
        }
        set
    }

    /// Uses another native random ordering function (MySQL: `RAND()`).
    pub fn with_random_function(mut self, function: impl Into<String>) -> Self {
        self.random_function = function.into();
        self
    }

    /// Registers (or replaces) a template in a module scope.
    pub fn register(&mut self, module: Option<&str>, name: &str, text: impl Into<String>) {
        self.templates
            .insert((module.map(str::to_string), name.to_string()), text.into());
    }

    pub fn contains(&self, module: Option<&str>, name: &str) -> bool {
        self.templates
            .contains_key(&(module.map(str::to_string), name.to_string()))
    }
}

impl QueryTemplates for TemplateSet {
    fn render(&self, module: Option<&str>, name: &str, params: &TemplateParams) -> Option<String> {
        let text = self
            .templates
            .get(&(module.map(str::to_string), name.to_string()))?;
        Some(substitute(text, params, &self.random_function))
    }
}

fn substitute(text: &str, params: &TemplateParams, random_function: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    let mut after_empty = false;
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_segment(&mut output, &text[last..whole.start()], after_empty);
        let key = &caps[1];
        let value = match params.get(key) {
            Some(value) => value.as_str(),
            None if key == "randomFunction" => random_function,
            None => "",
        };
        output.push_str(value);
        after_empty = value.is_empty();
        last = whole.end();
    }
    push_segment(&mut output, &text[last..], after_empty);
    output.trim().to_string()
}

// An empty substitution must not leave a doubled separator behind.
fn push_segment(output: &mut String, segment: &str, after_empty: bool) {
    if after_empty && output.ends_with(' ') {
        output.push_str(segment.trim_start_matches(' '));
    } else {
        output.push_str(segment);
    }
}

/// Builds [`TemplateParams`] from `(name, value)` pairs.
pub fn template_params<K, V, I>(pairs: I) -> TemplateParams
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
