//! Maps MySQL's `information_schema.COLUMNS` output onto the canonical
//! [`ColumnKind`]/[`DefaultKind`] taxonomy (spec.md §4.6), and normalizes
//! a peer schema that isn't MySQL's own for comparison
//! (`convert_unsupported_schema`). Mirrors
//! [`kitchensync_postgres::typemap`], adapted to MySQL's catalog and the
//! distinctions spec.md §4.6 calls out: `BLOB`/`TEXT` size buckets are
//! preserved rather than collapsed, `UnsignedInt` is native, and `ENUM`
//! values are carried through.

use kitchensync_schema::{Column, ColumnKind, Database, DefaultKind};

/// One row of `information_schema.COLUMNS` as far as type mapping cares.
pub struct RawColumnType<'a> {
    pub data_type: &'a str,
    pub column_type: &'a str,
    pub char_max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub extra: &'a str,
}

struct ParsedType {
    kind: ColumnKind,
    size: i64,
    scale: i64,
    type_restriction: Option<String>,
    reference_system: Option<String>,
    enumeration_values: Vec<String>,
    db_type_def: Option<String>,
}

fn simple(kind: ColumnKind) -> ParsedType {
    ParsedType {
        kind,
        size: 0,
        scale: 0,
        type_restriction: None,
        reference_system: None,
        enumeration_values: Vec::new(),
        db_type_def: None,
    }
}

fn sized(kind: ColumnKind, size: i64) -> ParsedType {
    ParsedType { size, ..simple(kind) }
}

/// Text/blob size buckets by storage class, in bytes — the limit
/// `TINYTEXT`/`TEXT`/`MEDIUMTEXT`/`LONGTEXT` (and their `*BLOB` twins)
/// actually enforce, which spec.md §4.6 requires preserving rather than
/// collapsing the way Postgres's single unsized `text`/`bytea` does.
fn blob_bucket_size(data_type: &str) -> i64 {
    match data_type {
        "tinyblob" | "tinytext" => 255,
        "blob" | "text" => 65_535,
        "mediumblob" | "mediumtext" => 16_777_215,
        "longblob" | "longtext" => 4_294_967_295,
        _ => 0,
    }
}

/// Parse `enum('a','b','c')` / `set('a','b')` from the full `COLUMN_TYPE`
/// string into its literal values, unescaping doubled single quotes.
fn parse_enum_values(column_type: &str) -> Vec<String> {
    let Some(inner) = column_type
        .strip_prefix("enum(")
        .or_else(|| column_type.strip_prefix("set("))
        .and_then(|s| s.strip_suffix(')'))
    else {
        return Vec::new();
    };
    let mut values = Vec::new();
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            let mut j = i + 1;
            let mut value = String::new();
            while j < bytes.len() {
                if bytes[j] == b'\'' {
                    if j + 1 < bytes.len() && bytes[j + 1] == b'\'' {
                        value.push('\'');
                        j += 2;
                        continue;
                    }
                    break;
                }
                value.push(bytes[j] as char);
                j += 1;
            }
            values.push(value);
            i = j + 1;
        } else {
            i += 1;
        }
    }
    values
}

/// Parse one `information_schema.COLUMNS` row into the canonical column
/// shape. Anything not recognized becomes `Unknown`, carrying the raw
/// `COLUMN_TYPE` string in `db_type_def` for diagnostics (spec.md §9).
fn parse_raw_column_type(raw: &RawColumnType<'_>) -> ParsedType {
    let unsigned = raw.column_type.contains("unsigned");
    let int_kind = if unsigned { ColumnKind::UnsignedInt } else { ColumnKind::SignedInt };

    match raw.data_type {
        "tinyint" if raw.column_type.starts_with("tinyint(1)") => simple(ColumnKind::Bool),
        "tinyint" => sized(int_kind, 1),
        "smallint" => sized(int_kind, 2),
        "mediumint" => sized(int_kind, 3),
        "int" | "integer" => sized(int_kind, 4),
        "bigint" => sized(int_kind, 8),
        "year" => sized(ColumnKind::SignedInt, 2),
        "float" => sized(ColumnKind::Real, 4),
        "double" | "double precision" => sized(ColumnKind::Real, 8),
        "decimal" | "numeric" => ParsedType {
            size: raw.numeric_precision.unwrap_or(0),
            scale: raw.numeric_scale.unwrap_or(0),
            ..simple(ColumnKind::Decimal)
        },
        "varchar" | "varbinary" => sized(
            if raw.data_type == "varbinary" { ColumnKind::Blob } else { ColumnKind::VarChar },
            raw.char_max_length.unwrap_or(0),
        ),
        "char" | "binary" => sized(
            if raw.data_type == "binary" { ColumnKind::Blob } else { ColumnKind::FixedChar },
            raw.char_max_length.unwrap_or(0),
        ),
        "text" | "tinytext" | "mediumtext" | "longtext" => sized(ColumnKind::Text, blob_bucket_size(raw.data_type)),
        "blob" | "tinyblob" | "mediumblob" | "longblob" => sized(ColumnKind::Blob, blob_bucket_size(raw.data_type)),
        "json" => simple(ColumnKind::Json),
        "date" => simple(ColumnKind::Date),
        "time" => simple(ColumnKind::Time),
        "datetime" => simple(ColumnKind::DateTime),
        "timestamp" => simple(ColumnKind::DateTime),
        "enum" => ParsedType { enumeration_values: parse_enum_values(raw.column_type), ..simple(ColumnKind::Enum) },
        "geometry" | "point" | "linestring" | "polygon" | "multipoint" | "multilinestring" | "multipolygon"
        | "geometrycollection" => ParsedType {
            type_restriction: (raw.data_type != "geometry").then(|| raw.data_type.to_string()),
            ..simple(ColumnKind::Spatial)
        },
        other => ParsedType { db_type_def: Some(raw.column_type.to_string()), ..simple_unknown(other) },
    }
}

fn simple_unknown(_data_type: &str) -> ParsedType {
    simple(ColumnKind::Unknown)
}

/// Apply [`parse_raw_column_type`]'s result, plus MySQL's `timestamp`
/// time-zone-like semantics, onto a fresh [`Column`] built from
/// introspection.
pub fn apply_column_type(column: &mut Column, raw: &RawColumnType<'_>) {
    let parsed = parse_raw_column_type(raw);
    column.kind = parsed.kind;
    column.size = parsed.size;
    column.scale = parsed.scale;
    column.type_restriction = parsed.type_restriction;
    column.reference_system = parsed.reference_system;
    column.enumeration_values = parsed.enumeration_values;
    column.db_type_def = parsed.db_type_def;
    if raw.data_type == "timestamp" {
        column.flags.set_mysql_timestamp(true);
        column.flags.set_time_zone(true);
    }
    if raw.extra.to_ascii_lowercase().contains("on update current_timestamp") {
        column.flags.set_mysql_on_update_timestamp(true);
    }
}

/// Canonicalize a `COLUMN_DEFAULT` / `EXTRA` pair from
/// `information_schema.COLUMNS` (spec.md §4.6). Returns `(kind, value)`.
pub fn parse_default(column_default: Option<&str>, extra: &str) -> (DefaultKind, Option<String>) {
    if extra.contains("auto_increment") {
        return (DefaultKind::Sequence, None);
    }
    match column_default {
        None => (DefaultKind::NoDefault, None),
        Some(expr) if expr.eq_ignore_ascii_case("CURRENT_TIMESTAMP") || expr.eq_ignore_ascii_case("now()") => {
            (DefaultKind::Expression, Some("CURRENT_TIMESTAMP".to_string()))
        }
        Some(expr) if expr.eq_ignore_ascii_case("NULL") => (DefaultKind::Expression, Some("NULL".to_string())),
        Some(expr) => (DefaultKind::Literal, Some(expr.to_string())),
    }
}

/// Normalize a peer's (non-MySQL) schema to what MySQL can faithfully
/// represent, in place, before schema-match compares it against this
/// adapter's own introspected schema (spec.md §4.6). MySQL keeps
/// `UnsignedInt` and `BLOB`/`TEXT` sizes natively, so this has much less
/// to normalize than Postgres's equivalent pass: only key-name length
/// (64 bytes, MySQL's identifier limit) needs truncating.
pub fn convert_unsupported_schema(peer: &mut Database) {
    for table in &mut peer.tables {
        for key in &mut table.keys {
            if key.name.len() > 64 {
                key.name.truncate(64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw<'a>(data_type: &'a str, column_type: &'a str) -> RawColumnType<'a> {
        RawColumnType {
            data_type,
            column_type,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            extra: "",
        }
    }

    #[test]
    fn tinyint_one_is_bool() {
        let p = parse_raw_column_type(&raw("tinyint", "tinyint(1)"));
        assert_eq!(p.kind, ColumnKind::Bool);
    }

    #[test]
    fn tinyint_wider_is_signed_int() {
        let p = parse_raw_column_type(&raw("tinyint", "tinyint(4)"));
        assert_eq!(p.kind, ColumnKind::SignedInt);
        assert_eq!(p.size, 1);
    }

    #[test]
    fn unsigned_int_is_native() {
        let p = parse_raw_column_type(&raw("int", "int(10) unsigned"));
        assert_eq!(p.kind, ColumnKind::UnsignedInt);
        assert_eq!(p.size, 4);
    }

    #[test]
    fn blob_bucket_sizes_are_preserved() {
        let tiny = parse_raw_column_type(&raw("tinyblob", "tinyblob"));
        let medium = parse_raw_column_type(&raw("mediumtext", "mediumtext"));
        assert_eq!(tiny.size, 255);
        assert_eq!(medium.size, 16_777_215);
    }

    #[test]
    fn decimal_carries_precision_and_scale() {
        let raw_type = RawColumnType {
            data_type: "decimal",
            column_type: "decimal(10,2)",
            char_max_length: None,
            numeric_precision: Some(10),
            numeric_scale: Some(2),
            extra: "",
        };
        let p = parse_raw_column_type(&raw_type);
        assert_eq!(p.kind, ColumnKind::Decimal);
        assert_eq!(p.size, 10);
        assert_eq!(p.scale, 2);
    }

    #[test]
    fn enum_values_are_parsed_and_unescaped() {
        let p = parse_raw_column_type(&raw("enum", "enum('a','b''s','c')"));
        assert_eq!(p.kind, ColumnKind::Enum);
        assert_eq!(p.enumeration_values, vec!["a", "b's", "c"]);
    }

    #[test]
    fn auto_increment_extra_maps_to_sequence() {
        let (kind, value) = parse_default(None, "auto_increment");
        assert_eq!(kind, DefaultKind::Sequence);
        assert_eq!(value, None);
    }

    #[test]
    fn current_timestamp_default_canonicalizes() {
        let (kind, value) = parse_default(Some("CURRENT_TIMESTAMP"), "");
        assert_eq!(kind, DefaultKind::Expression);
        assert_eq!(value.as_deref(), Some("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn literal_default_is_kept_verbatim() {
        let (kind, value) = parse_default(Some("hello"), "");
        assert_eq!(kind, DefaultKind::Literal);
        assert_eq!(value.as_deref(), Some("hello"));
    }

    #[test]
    fn unrecognized_type_becomes_unknown_with_raw_string() {
        let p = parse_raw_column_type(&raw("vector", "vector(128)"));
        assert_eq!(p.kind, ColumnKind::Unknown);
        assert_eq!(p.db_type_def.as_deref(), Some("vector(128)"));
    }

    #[test]
    fn on_update_current_timestamp_extra_sets_flag() {
        let raw_type = RawColumnType {
            data_type: "timestamp",
            column_type: "timestamp",
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            extra: "on update CURRENT_TIMESTAMP",
        };
        let mut column = Column::new("updated_at", ColumnKind::Unknown);
        apply_column_type(&mut column, &raw_type);
        assert!(column.flags.mysql_on_update_timestamp());
    }

    #[test]
    fn plain_timestamp_without_extra_leaves_flag_unset() {
        let raw_type = raw("timestamp", "timestamp");
        let mut column = Column::new("created_at", ColumnKind::Unknown);
        apply_column_type(&mut column, &raw_type);
        assert!(!column.flags.mysql_on_update_timestamp());
    }
}
