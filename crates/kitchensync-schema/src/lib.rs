//! Canonical schema model and schema-match engine for Kitchen Sync.
//!
//! - [`model`] — `Database`/`Table`/`Column`/`Key` and their enums (C3)
//! - [`wire`] — (de)serialization of that model into the wire's map shape
//! - [`schema_match`] — pure comparison of two schemas (C7)

pub mod model;
pub mod schema_match;
pub mod wire;

pub use model::{
    Column, ColumnFlags, ColumnIndex, ColumnKind, Database, DefaultKind, Key, KeyKind, PrimaryKeyKind, Table,
};
pub use schema_match::{check_schema_match, check_schema_match_filtered, TableFilter};
