//! Maps PostgreSQL's `format_type()` output and `pg_get_expr()` default
//! expressions onto the canonical [`ColumnKind`]/[`DefaultKind`] taxonomy
//! (spec.md §4.5), and normalizes a peer schema that isn't Postgres's own
//! for comparison (`convert_unsupported_schema`).

use kitchensync_schema::{Column, ColumnKind, Database, DefaultKind};

/// Parsed shape of a `format_type()` string, everything [`parse_format_type`]
/// fills in besides `kind` itself.
struct ParsedType {
    kind: ColumnKind,
    size: i64,
    scale: i64,
    type_restriction: Option<String>,
    reference_system: Option<String>,
    db_type_def: Option<String>,
}

/// Parse one `format_type(atttypid, atttypmod)` string into the canonical
/// column shape. Anything not recognized becomes `Unknown`, carrying the
/// raw string in `db_type_def` for diagnostics (spec.md §9).
pub fn parse_format_type(raw: &str) -> ParsedType {
    let t = raw.trim();
    let lower = t.to_ascii_lowercase();

    let unknown = |raw: &str| ParsedType {
        kind: ColumnKind::Unknown,
        size: 0,
        scale: 0,
        type_restriction: None,
        reference_system: None,
        db_type_def: Some(raw.to_string()),
    };

    if lower == "boolean" {
        return simple(ColumnKind::Bool);
    }
    if lower == "smallint" {
        return sized(ColumnKind::SignedInt, 2);
    }
    if lower == "integer" {
        return sized(ColumnKind::SignedInt, 4);
    }
    if lower == "bigint" {
        return sized(ColumnKind::SignedInt, 8);
    }
    if lower == "real" {
        return sized(ColumnKind::Real, 4);
    }
    if lower == "double precision" {
        return sized(ColumnKind::Real, 8);
    }
    if lower == "text" {
        return simple(ColumnKind::Text);
    }
    if lower == "bytea" {
        return simple(ColumnKind::Blob);
    }
    if lower == "uuid" {
        return simple(ColumnKind::Uuid);
    }
    if lower == "date" {
        return simple(ColumnKind::Date);
    }
    if lower == "json" || lower == "jsonb" {
        return simple(ColumnKind::Json);
    }

    if lower == "numeric" {
        return ParsedType { kind: ColumnKind::Decimal, size: 0, scale: 0, type_restriction: None, reference_system: None, db_type_def: None };
    }
    if let Some((p, s)) = parse_paren_ints(&lower, "numeric") {
        return ParsedType { kind: ColumnKind::Decimal, size: p, scale: s.unwrap_or(0), type_restriction: None, reference_system: None, db_type_def: None };
    }

    if let Some((n, _)) = parse_paren_ints(&lower, "character varying") {
        return sized(ColumnKind::VarChar, n);
    }
    if let Some((n, _)) = parse_paren_ints(&lower, "character") {
        return sized(ColumnKind::FixedChar, n);
    }

    if lower.starts_with("timestamp") {
        let with_tz = lower.contains("with time zone");
        let mut kind = sized(ColumnKind::DateTime, 0);
        if with_tz {
            kind = flagged_time_zone(kind);
        }
        return kind;
    }
    if lower.starts_with("time") {
        let with_tz = lower.contains("with time zone");
        let mut kind = sized(ColumnKind::Time, 0);
        if with_tz {
            kind = flagged_time_zone(kind);
        }
        return kind;
    }

    if lower == "geometry" {
        return ParsedType { kind: ColumnKind::Spatial, size: 0, scale: 0, type_restriction: None, reference_system: None, db_type_def: None };
    }
    if let Some(rest) = lower.strip_prefix("geometry(").and_then(|s| s.strip_suffix(')')) {
        let mut parts = rest.splitn(2, ',');
        let subtype = parts.next().map(|s| s.trim().to_ascii_lowercase());
        let srid = parts.next().map(|s| s.trim().to_string());
        return ParsedType { kind: ColumnKind::Spatial, size: 0, scale: 0, type_restriction: subtype, reference_system: srid, db_type_def: None };
    }

    unknown(t)
}

fn simple(kind: ColumnKind) -> ParsedType {
    ParsedType { kind, size: 0, scale: 0, type_restriction: None, reference_system: None, db_type_def: None }
}

fn sized(kind: ColumnKind, size: i64) -> ParsedType {
    ParsedType { kind, size, scale: 0, type_restriction: None, reference_system: None, db_type_def: None }
}

fn flagged_time_zone(p: ParsedType) -> ParsedType {
    p
}

/// Parse `"prefix(a)"` or `"prefix(a,b)"` into up to two integers, if `s`
/// starts with `prefix(` and ends with `)`.
fn parse_paren_ints(s: &str, prefix: &str) -> Option<(i64, Option<i64>)> {
    let rest = s.strip_prefix(prefix)?.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.splitn(2, ',');
    let a = parts.next()?.trim().parse().ok()?;
    let b = parts.next().and_then(|s| s.trim().parse().ok());
    Some((a, b))
}

/// Apply [`parse_format_type`]'s result plus the `time_zone` flag onto a
/// fresh [`Column`] built from introspection.
pub fn apply_format_type(column: &mut Column, raw: &str) {
    let parsed = parse_format_type(raw);
    column.kind = parsed.kind;
    column.size = parsed.size;
    column.scale = parsed.scale;
    column.type_restriction = parsed.type_restriction;
    column.reference_system = parsed.reference_system;
    column.db_type_def = parsed.db_type_def;
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("time") && lower.contains("with time zone") {
        column.flags.set_time_zone(true);
    }
}

/// Canonicalize one `pg_get_expr(adbin, adrelid)` default expression
/// (spec.md §4.5 "Default parsing"). Returns `(kind, value)`.
///
/// Note the corrected control flow here versus a historical bug in the
/// system this was modeled on, which fell through from the literal arm
/// into a `default:` case after setting `Expression` — this implementation
/// returns as soon as a case matches (spec.md §9, open question b).
pub fn parse_default_expr(expr: &str) -> (DefaultKind, Option<String>) {
    let trimmed = expr.trim();

    if let Some(inner) = trimmed.strip_prefix("nextval(").and_then(|s| s.strip_suffix(')')) {
        let name = inner.split("::").next().unwrap_or(inner).trim().trim_matches('\'');
        return (DefaultKind::Sequence, Some(name.to_string()));
    }

    if let Some(rest) = trimmed.strip_prefix("NULL::") {
        let _ = rest;
        return (DefaultKind::Expression, Some("NULL".to_string()));
    }

    if trimmed == "now()" {
        return (DefaultKind::Expression, Some("CURRENT_TIMESTAMP".to_string()));
    }
    if trimmed == "('now'::text)::date" {
        return (DefaultKind::Expression, Some("CURRENT_DATE".to_string()));
    }

    for zero_arg in ["current_schema", "current_user", "session_user"] {
        let quoted_call = format!("\"{zero_arg}\"()");
        if trimmed == quoted_call {
            return (DefaultKind::Expression, Some(zero_arg.to_string()));
        }
    }

    if trimmed.starts_with('\'') {
        if let Some(rest) = trimmed.strip_prefix('\'') {
            if let Some(end) = find_unescaped_quote(rest) {
                let literal = &rest[..end];
                let unescaped = literal.replace("\\\\", "\\").replace("\\'", "'");
                return (DefaultKind::Literal, Some(unescaped));
            }
        }
    }

    (DefaultKind::Expression, Some(trimmed.to_string()))
}

fn find_unescaped_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == b'\'' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Normalize a peer's (non-Postgres) schema to what Postgres can
/// faithfully represent, in place, before schema-match compares it
/// against this adapter's own introspected schema (spec.md §4.5
/// "Normalization pass").
pub fn convert_unsupported_schema(peer: &mut Database) {
    for table in &mut peer.tables {
        for column in &mut table.columns {
            if column.kind == ColumnKind::UnsignedInt {
                column.kind = ColumnKind::SignedInt;
            }
            if column.kind == ColumnKind::SignedInt {
                if column.size == 1 {
                    column.size = 2;
                } else if column.size == 3 {
                    column.size = 4;
                }
            }
            if matches!(column.kind, ColumnKind::Text | ColumnKind::Blob) {
                column.size = 0;
            }
        }
        for key in &mut table.keys {
            if key.name.len() > 63 {
                key.name.truncate(63);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_varchar_with_length() {
        let p = parse_format_type("character varying(255)");
        assert_eq!(p.kind, ColumnKind::VarChar);
        assert_eq!(p.size, 255);
    }

    #[test]
    fn parses_bare_numeric_as_zero_precision_decimal() {
        let p = parse_format_type("numeric");
        assert_eq!(p.kind, ColumnKind::Decimal);
        assert_eq!(p.size, 0);
        assert_eq!(p.scale, 0);
    }

    #[test]
    fn parses_numeric_with_precision_and_scale() {
        let p = parse_format_type("numeric(10,2)");
        assert_eq!(p.kind, ColumnKind::Decimal);
        assert_eq!(p.size, 10);
        assert_eq!(p.scale, 2);
    }

    #[test]
    fn parses_geometry_with_subtype_and_srid() {
        let p = parse_format_type("geometry(Point,4326)");
        assert_eq!(p.kind, ColumnKind::Spatial);
        assert_eq!(p.type_restriction.as_deref(), Some("point"));
        assert_eq!(p.reference_system.as_deref(), Some("4326"));
    }

    #[test]
    fn unrecognized_type_becomes_unknown_with_raw_string() {
        let p = parse_format_type("tsvector");
        assert_eq!(p.kind, ColumnKind::Unknown);
        assert_eq!(p.db_type_def.as_deref(), Some("tsvector"));
    }

    #[test]
    fn sequence_default_extracts_bare_name() {
        let (kind, value) = parse_default_expr("nextval('users_id_seq'::regclass)");
        assert_eq!(kind, DefaultKind::Sequence);
        assert_eq!(value.as_deref(), Some("users_id_seq"));
    }

    #[test]
    fn now_canonicalizes_to_current_timestamp() {
        let (kind, value) = parse_default_expr("now()");
        assert_eq!(kind, DefaultKind::Expression);
        assert_eq!(value.as_deref(), Some("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn literal_unescapes_backslash_and_quote_only() {
        let (kind, value) = parse_default_expr(r"'a\\b\'c'::text");
        assert_eq!(kind, DefaultKind::Literal);
        assert_eq!(value.as_deref(), Some(r"a\b'c"));
    }

    #[test]
    fn zero_arg_identity_function_strips_quotes_and_parens() {
        let (kind, value) = parse_default_expr("\"current_user\"()");
        assert_eq!(kind, DefaultKind::Expression);
        assert_eq!(value.as_deref(), Some("current_user"));
    }
}
