//! SQL literal escaping for PostgreSQL (spec.md §4.5 "Value escaping").

use kitchensync_core::value::PackedValue;
use kitchensync_schema::{Column, ColumnKind};

/// Equivalent of `PQescapeStringConn`: doubles `'` and escapes `\`,
/// wrapped in a standard-conforming-strings literal.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Postgres `bytea` hex-escape literal: `'\x<hex>'`.
pub fn escape_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 4);
    out.push_str("'\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out.push('\'');
    out
}

/// `wkb` is canonical WKB-with-4-byte-SRID-prefix (big-endian u32 SRID,
/// then the WKB body); strip the prefix and pass it to `ST_GeomFromWKB`
/// with the SRID as the second argument (spec.md §4.5, §8 scenario 6).
pub fn escape_spatial(wkb: &[u8]) -> String {
    if wkb.len() < 4 {
        return format!("ST_GeomFromWKB({})", escape_bytea(wkb));
    }
    let srid = u32::from_be_bytes([wkb[0], wkb[1], wkb[2], wkb[3]]);
    let body = &wkb[4..];
    format!("ST_GeomFromWKB({}, {})", escape_bytea(body), srid)
}

/// Dispatch on `column.kind` to escape one wire cell as a SQL literal
/// (spec.md §4.4's `escape_column_value`).
pub fn escape_column_value(column: &Column, value: &PackedValue) -> String {
    if value.is_nil() {
        return "NULL".to_string();
    }
    match column.kind {
        ColumnKind::Bool => match value.as_bool() {
            Some(true) => "TRUE".to_string(),
            Some(false) => "FALSE".to_string(),
            None => "NULL".to_string(),
        },
        ColumnKind::SignedInt | ColumnKind::UnsignedInt => value
            .as_i64()
            .map(|v| v.to_string())
            .or_else(|| value.as_u64().map(|v| v.to_string()))
            .unwrap_or_else(|| "NULL".to_string()),
        ColumnKind::Real | ColumnKind::Decimal => value
            .as_f64()
            .map(|v| v.to_string())
            .or_else(|| value.as_str().map(escape_string))
            .unwrap_or_else(|| "NULL".to_string()),
        ColumnKind::Blob => match value {
            PackedValue::Bytes(b) => escape_bytea(b),
            _ => "NULL".to_string(),
        },
        ColumnKind::Spatial => match value {
            PackedValue::Bytes(b) => escape_spatial(b),
            _ => "NULL".to_string(),
        },
        _ => match value {
            PackedValue::Bytes(b) => escape_string(&String::from_utf8_lossy(b)),
            _ => "NULL".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_string_doubles_quote_and_escapes_backslash() {
        assert_eq!(escape_string(r"O'Brien\x"), r"'O''Brien\\x'");
    }

    #[test]
    fn escape_bytea_produces_hex_literal() {
        assert_eq!(escape_bytea(&[0xde, 0xad]), "'\\xdead'");
    }

    #[test]
    fn escape_spatial_strips_srid_prefix_and_appends_as_argument() {
        let mut wkb = 4326u32.to_be_bytes().to_vec();
        wkb.extend_from_slice(&[0x01, 0x02]);
        assert_eq!(escape_spatial(&wkb), "ST_GeomFromWKB('\\x0102', 4326)");
    }

    #[test]
    fn null_cell_escapes_to_null_regardless_of_column_kind() {
        let column = Column::new("x", ColumnKind::SignedInt);
        assert_eq!(escape_column_value(&column, &PackedValue::Nil), "NULL");
    }
}
