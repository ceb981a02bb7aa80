//! Record-side data model.
//!
//! # Responsibility
//! - Define dynamic field values and row maps.
//! - Define column metadata and the fixed type-category enumeration.
//! - Define model bindings (table, module, flags, override templates).
//!
//! # Invariants
//! - Column descriptors are immutable once built by the schema catalog.
//! - Row maps are keyed by column name.

pub mod column;
pub mod definition;
pub mod value;
