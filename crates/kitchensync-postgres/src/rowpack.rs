//! Row-pack contract (spec.md §4.4): turn one decoded PostgreSQL
//! [`driver::Row`] into the wire-ready `PackedValue` array a row-bearing
//! reply carries, one cell per column in the table's column order.
//!
//! Geometry cells arrive over the wire as a hex-encoded EWKB string — the
//! generic decoder in [`crate::types::decode`] has no PostGIS-specific
//! knowledge and falls back to text for any OID it doesn't recognize, and
//! PostGIS itself returns geometry as hex EWKB in the text protocol. This
//! module hoists EWKB's embedded SRID into the 4-byte big-endian SRID
//! prefix the rest of Kitchen Sync treats as canonical WKB (see
//! [`crate::escape::escape_spatial`], spec.md §8 scenario 6).

use kitchensync_adapter::driver::{Row, Value};
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
        return pack_spatial_cell(value);
    }
    pack_cell(column.kind, value)
}

fn pack_spatial_cell(value: &Value) -> PackedValue {
    match value {
        Value::Null => PackedValue::Nil,
        Value::Text(hex) => match decode_hex(hex) {
            Some(ewkb) => PackedValue::Bytes(ewkb_to_srid_prefixed_wkb(&ewkb)),
            None => PackedValue::Nil,
        },
        Value::Bytes(raw) => PackedValue::Bytes(ewkb_to_srid_prefixed_wkb(raw)),
        _ => PackedValue::Nil,
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if !s.len().is_multiple_of(2) {
        return None;
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut i = 0;
    while i < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16)?;
        let lo = (bytes[i + 1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
        i += 2;
    }
    Some(out)
}

const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// EWKB layout: 1 byte order, 4 bytes geometry type (high bit
/// `EWKB_SRID_FLAG` set when an SRID follows), an optional 4-byte SRID,
/// then the WKB body. Strip the SRID flag from the type word (yielding
/// plain WKB) and hoist the SRID — 0 if the geometry carried none — into
/// a 4-byte big-endian prefix ahead of it.
fn ewkb_to_srid_prefixed_wkb(ewkb: &[u8]) -> Vec<u8> {
    if ewkb.len() < 5 {
        let mut out = vec![0_u8; 4];
        out.extend_from_slice(ewkb);
        return out;
    }
    let little_endian = ewkb[0] != 0;
    let read_u32 = |b: &[u8]| -> u32 {
        let arr = [b[0], b[1], b[2], b[3]];
        if little_endian { u32::from_le_bytes(arr) } else { u32::from_be_bytes(arr) }
    };
    let write_u32 = |v: u32| -> [u8; 4] {
        if little_endian { v.to_le_bytes() } else { v.to_be_bytes() }
    };

    let geom_type = read_u32(&ewkb[1..5]);
    let has_srid = geom_type & EWKB_SRID_FLAG != 0;
    let (srid, body_start) =
        if has_srid && ewkb.len() >= 9 { (read_u32(&ewkb[5..9]), 9) } else { (0, 5) };
    let plain_type = geom_type & !EWKB_SRID_FLAG;

    let mut out = Vec::with_capacity(4 + 5 + (ewkb.len() - body_start));
    out.extend_from_slice(&srid.to_be_bytes());
    out.push(ewkb[0]);
    out.extend_from_slice(&write_u32(plain_type));
    out.extend_from_slice(&ewkb[body_start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A little-endian EWKB Point with SRID 4326: byte order 1, type
    /// 0x20000001 (Point | SRID flag), SRID 4326, then 16 bytes of XY.
    fn sample_ewkb_point_with_srid() -> Vec<u8> {
        let mut b = vec![1_u8];
        b.extend_from_slice(&0x2000_0001_u32.to_le_bytes());
        b.extend_from_slice(&4326_u32.to_le_bytes());
        b.extend_from_slice(&1.0_f64.to_le_bytes());
        b.extend_from_slice(&2.0_f64.to_le_bytes());
        b
    }

    #[test]
    fn ewkb_with_srid_hoists_srid_into_four_byte_prefix() {
        let ewkb = sample_ewkb_point_with_srid();
        let wkb = ewkb_to_srid_prefixed_wkb(&ewkb);
        let srid = u32::from_be_bytes([wkb[0], wkb[1], wkb[2], wkb[3]]);
        assert_eq!(srid, 4326);
        // Plain WKB body: byte order + type with SRID flag cleared.
        assert_eq!(wkb[4], 1);
        let plain_type = u32::from_le_bytes([wkb[5], wkb[6], wkb[7], wkb[8]]);
        assert_eq!(plain_type, 1);
    }

    #[test]
    fn ewkb_without_srid_prefixes_zero() {
        let mut ewkb = vec![1_u8];
        ewkb.extend_from_slice(&1_u32.to_le_bytes());
        ewkb.extend_from_slice(&1.0_f64.to_le_bytes());
        ewkb.extend_from_slice(&2.0_f64.to_le_bytes());
        let wkb = ewkb_to_srid_prefixed_wkb(&ewkb);
        assert_eq!(&wkb[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn decode_hex_rejects_odd_length() {
        assert!(decode_hex("abc").is_none());
    }

    #[test]
    fn null_spatial_cell_packs_to_nil() {
        assert_eq!(pack_spatial_cell(&Value::Null), PackedValue::Nil);
    }
}
