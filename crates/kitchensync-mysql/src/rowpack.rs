//! Row-pack contract (spec.md §4.4): turn one decoded MySQL
//! [`driver::Row`] into the wire-ready `PackedValue` array a row-bearing
//! reply carries, one cell per column in the table's column order.
//!
//! Unlike PostgreSQL's PostGIS extension, MySQL's own `GEOMETRY` storage
//! format is already a 4-byte SRID prefix followed by plain WKB — exactly
//! the canonical wire shape [`crate::escape::escape_spatial`] expects —
//! so there is no EWKB hoisting step here (contrast
//! [`kitchensync_postgres::rowpack`]).

use kitchensync_adapter::driver::Row;
use kitchensync_adapter::pack_cell;
use kitchensync_core::value::PackedValue;
use kitchensync_schema::{Column, ColumnKind, Table};

/// Pack one row into wire cells, in `table.columns` order. A column with
/// no matching value in `row` (e.g. a query that didn't select it) packs
/// as nil.
pub fn pack_row(table: &Table, row: &Row) -> Vec<PackedValue> {
    table.columns.iter().map(|column| pack_cell_for(column, row)).collect()
}

fn pack_cell_for(column: &Column, row: &Row) -> PackedValue {
    let Some(value) = row.get_by_name(&column.name) else {
        return PackedValue::Nil;
    };
    if column.kind == ColumnKind::Spatial {
        return match value.as_bytes() {
            Some(bytes) => PackedValue::Bytes(bytes.to_vec()),
            None => PackedValue::Nil,
        };
    }
    pack_cell(column.kind, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitchensync_adapter::driver::Value;

    #[test]
    fn spatial_cell_passes_native_srid_prefixed_wkb_through() {
        let mut srid_prefixed = 4326u32.to_be_bytes().to_vec();
        srid_prefixed.extend_from_slice(&[1, 2, 3]);
        let row = Row::new(vec!["geo".to_string()], vec![Value::Bytes(srid_prefixed.clone())]);
        let column = Column::new("geo", ColumnKind::Spatial);
        assert_eq!(pack_cell_for(&column, &row), PackedValue::Bytes(srid_prefixed));
    }

    #[test]
    fn missing_column_packs_to_nil() {
        let row = Row::new(vec!["other".to_string()], vec![Value::Int(1)]);
        let column = Column::new("absent", ColumnKind::SignedInt);
        assert_eq!(pack_cell_for(&column, &row), PackedValue::Nil);
    }
}
