//! Column metadata derived from store introspection.
//!
//! # Responsibility
//! - Classify raw store type names into a fixed set of categories.
//! - Parse `basetype(length|enum-list) [unsigned]` declarations.
//! - Build immutable column descriptors with consistent derived flags.
//!
//! # Invariants
//! - `quotes_required == !(integer || float)`.
//! - `numeric` and `blob` always agree with `kind`.

use crate::store::DescribeRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column name -> descriptor for one table.
pub type TableSchema = BTreeMap<String, ColumnDescriptor>;

/// Normalized type family of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Integer,
    Float,
    String,
    Text,
    Blob,
    Date,
    Enum,
    /// Anything the classifier does not recognize; treated as quoted text.
    Other,
}

impl TypeCategory {
    /// Classifies a lowercase base type name (`int`, `varchar`, `datetime`...).
    pub fn classify(base_type: &str) -> Self {
        match base_type.trim().to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => Self::Integer,
            "float" | "double" | "decimal" | "real" | "numeric" => Self::Float,
            "char" | "varchar" => Self::String,
            "tinytext" | "mediumtext" | "text" | "longtext" => Self::Text,
            "tinyblob" | "mediumblob" | "blob" | "longblob" => Self::Blob,
            "date" | "datetime" | "time" | "timestamp" => Self::Date,
            "enum" => Self::Enum,
            _ => Self::Other,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn quotes_required(self) -> bool {
        !self.is_numeric()
    }

    pub fn is_blob(self) -> bool {
        matches!(self, Self::Text | Self::Blob)
    }

    /// String-like columns that may carry per-language translations.
    pub fn is_localisable(self) -> bool {
        matches!(self, Self::String | Self::Text)
    }
}

/// Parsed form of a raw type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeInfo {
    pub base_type: String,
    pub length: Option<u32>,
    pub enum_values: Vec<String>,
    pub unsigned: bool,
}

/// Parses a declaration such as `int(10) unsigned` or `enum('a','b')`.
///
/// Splits on the first `(`; for `enum` the parenthesized part is a literal
/// list, otherwise its leading digits are the length. Any `unsigned` token
/// after the type name sets the unsigned flag. Only the base type and
/// keywords are case-folded; enum literals keep their case.
pub fn parse_type_info(declaration: &str) -> TypeInfo {
    let declaration = declaration.trim();
    let (head, rest) = match declaration.find('(') {
        Some(open) => {
            let close = declaration[open..]
                .find(')')
                .map_or(declaration.len(), |offset| open + offset);
            (
                &declaration[..open],
                Some((&declaration[open + 1..close], &declaration[close..])),
            )
        }
        None => (declaration, None),
    };

    let mut tokens = head.split_whitespace();
    let base_type = tokens.next().unwrap_or_default().to_ascii_lowercase();
    let mut trailing: Vec<&str> = tokens.collect();

    let mut info = TypeInfo {
        base_type,
        ..TypeInfo::default()
    };

    if let Some((inner, after)) = rest {
        if info.base_type == "enum" {
            info.enum_values = inner
                .split(',')
                .map(|item| item.trim().trim_matches('\'').to_string())
                .filter(|item| !item.is_empty())
                .collect();
        } else {
            let digits: String = inner
                .trim()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            info.length = digits.parse().ok();
        }
        trailing.extend(after.trim_start_matches(')').split_whitespace());
    }

    info.unsigned = trailing
        .iter()
        .any(|token| token.eq_ignore_ascii_case("unsigned"));
    info
}

/// Metadata for one column of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub table_name: String,
    #[serde(rename = "type")]
    pub kind: TypeCategory,
    /// Raw base type as reported by the store (`varchar`, `datetime`...).
    pub base_type: String,
    pub length: Option<u32>,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique_key: bool,
    pub multiple_key: bool,
    pub auto_increment: bool,
    pub numeric: bool,
    pub blob: bool,
    pub unsigned: bool,
    pub quotes_required: bool,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    /// Builds a descriptor from one introspection row.
    pub fn from_describe(table_name: &str, row: &DescribeRow) -> Self {
        let info = parse_type_info(&row.type_decl);
        let kind = TypeCategory::classify(&info.base_type);
        Self {
            name: row.field.clone(),
            table_name: table_name.to_string(),
            kind,
            base_type: info.base_type,
            length: info.length,
            not_null: !row.nullable,
            primary_key: row.key == "PRI",
            unique_key: row.key == "UNI",
            multiple_key: row.key == "MUL",
            auto_increment: row.extra.contains("auto_increment"),
            numeric: kind.is_numeric(),
            blob: kind.is_blob(),
            unsigned: info.unsigned,
            quotes_required: kind.quotes_required(),
            nullable: row.nullable,
            enum_values: info.enum_values,
            default_value: row.default.clone(),
        }
    }

    /// Convenience constructor for a column with only a name and a type.
    pub fn new(table_name: &str, name: &str, type_decl: &str, nullable: bool) -> Self {
        Self::from_describe(
            table_name,
            &DescribeRow {
                field: name.to_string(),
                type_decl: type_decl.to_string(),
                nullable,
                key: String::new(),
                default: None,
                extra: String::new(),
            },
        )
    }

    /// Rendering hint kept from the store's tabular views.
    pub fn alignment(&self) -> &'static str {
        if self.numeric {
            "right"
        } else {
            "left"
        }
    }
}
