//! Type-aware conversion of field values into statement literals.
//!
//! # Responsibility
//! - Turn any [`FieldValue`] into a store-safe literal for one column.
//! - Apply null handling, markup stripping, quoting and numeric coercion.
//!
//! # Invariants
//! - Encoding is total: every input yields a literal, nothing fails.
//! - Malformed numeric text coerces to `0` / `0.0`.
//! - Empty text for date columns becomes `NULL`.

use crate::model::column::{ColumnDescriptor, TypeCategory};
use crate::model::value::FieldValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

static MARKUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!?][^>]*>").expect("valid markup regex"));
static LEADING_FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("valid float regex")
});
static LEADING_INT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?\d+").expect("valid integer regex"));

/// Encoded value ready to be spliced into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Integer(i64),
    Float(f64),
    /// Unquoted text; quoting and escaping happen on display.
    Quoted(String),
}

impl Literal {
    /// Value the store is expected to hold after writing this literal.
    pub fn to_value(&self) -> FieldValue {
        match self {
            Self::Null => FieldValue::Null,
            Self::Integer(value) => FieldValue::Integer(*value),
            Self::Float(value) => FieldValue::Float(*value),
            Self::Quoted(value) => FieldValue::Text(value.clone()),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            // Debug keeps the fractional part (`3.0`, `12.5`).
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Quoted(value) => write!(f, "'{}'", value.replace('\'', "''")),
        }
    }
}

/// Stateless encoder parameterized by the record's markup policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueCodec {
    allow_html: bool,
}

impl ValueCodec {
    pub fn new(allow_html: bool) -> Self {
        Self { allow_html }
    }

    /// Encodes `value` for `column`.
    pub fn encode(&self, value: &FieldValue, column: &ColumnDescriptor) -> Literal {
        if column.nullable && value.is_null() {
            return Literal::Null;
        }
        if column.kind == TypeCategory::Date && value.to_text().is_empty() {
            return Literal::Null;
        }
        if column.quotes_required {
            let text = value.to_text();
            let text = if self.allow_html {
                text
            } else {
                strip_markup(&text)
            };
            return Literal::Quoted(text);
        }
        if column.kind == TypeCategory::Float {
            return Literal::Float(coerce_float(value));
        }
        Literal::Integer(coerce_integer(value))
    }

    /// Encodes and renders in one step.
    pub fn encode_sql(&self, value: &FieldValue, column: &ColumnDescriptor) -> String {
        self.encode(value, column).to_string()
    }
}

/// Removes tags and comments, keeping the text between them.
pub fn strip_markup(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    MARKUP_RE.replace_all(text, "").into_owned()
}

fn coerce_float(value: &FieldValue) -> f64 {
    let parsed = match value {
        FieldValue::Integer(number) => *number as f64,
        FieldValue::Float(number) => *number,
        other => {
            let text = other.to_text().replace(',', ".");
            LEADING_FLOAT_RE
                .find(&text)
                .and_then(|found| found.as_str().trim().parse::<f64>().ok())
                .unwrap_or(0.0)
        }
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

fn coerce_integer(value: &FieldValue) -> i64 {
    match value {
        FieldValue::Integer(number) => *number,
        FieldValue::Float(number) if number.is_finite() => number.trunc() as i64,
        FieldValue::Float(_) => 0,
        other => {
            let text = other.to_text().replace(',', "");
            let Some(found) = LEADING_INT_RE.find(&text) else {
                return 0;
            };
            let digits = found.as_str().trim();
            digits.parse::<i64>().unwrap_or_else(|_| {
                if digits.starts_with('-') {
                    i64::MIN
                } else {
                    i64::MAX
                }
            })
        }
    }
}
