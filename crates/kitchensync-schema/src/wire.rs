//! Wire (de)serialization of the canonical schema model, into the map
//! shape spec.md §6 describes. Enums are serialized by name, never by
//! numeric value (forward compatible across major protocol versions).
//! Unknown map keys are ignored on read.

use kitchensync_core::codec;
use kitchensync_core::error::{CodecError, Error, Result};
use kitchensync_core::value::PackedValue;

use crate::model::{Column, ColumnFlags, ColumnKind, Database, DefaultKind, Key, KeyKind, PrimaryKeyKind, Table};

fn map(entries: Vec<(&str, PackedValue)>) -> PackedValue {
    PackedValue::Map(entries.into_iter().map(|(k, v)| (PackedValue::from(k), v)).collect())
}

fn require_map<'a>(value: &'a PackedValue, what: &'static str) -> Result<&'a [(PackedValue, PackedValue)]> {
    value.as_map().ok_or_else(|| Error::Codec(CodecError::TypeMismatch { expected: what, found: value.type_name() }))
}

pub fn encode_database(db: &Database) -> PackedValue {
    let tables: Vec<PackedValue> = db.tables.iter().map(encode_table).collect();
    map(vec![("tables", PackedValue::Array(tables))])
}

pub fn decode_database(value: &PackedValue) -> Result<Database> {
    let entries = require_map(value, "database map")?;
    let tables_value = entries
        .iter()
        .find(|(k, _)| k.as_str() == Some("tables"))
        .map(|(_, v)| v)
        .ok_or(Error::Codec(CodecError::TypeMismatch { expected: "tables key", found: "missing" }))?;
    let tables = codec::expect_array(tables_value)?;
    let tables = tables.iter().map(decode_table).collect::<Result<Vec<_>>>()?;
    Ok(Database { tables })
}

fn encode_table(table: &Table) -> PackedValue {
    let columns: Vec<PackedValue> = table.columns.iter().map(encode_column).collect();
    let primary_key_columns: Vec<PackedValue> =
        table.primary_key_columns.iter().map(|&i| PackedValue::Int(i as i64)).collect();
    let keys: Vec<PackedValue> = table.keys.iter().map(encode_key).collect();
    map(vec![
        ("name", PackedValue::from(table.name.as_str())),
        ("columns", PackedValue::Array(columns)),
        ("primary_key_columns", PackedValue::Array(primary_key_columns)),
        ("primary_key_type", PackedValue::from(table.primary_key_kind.as_str())),
        ("keys", PackedValue::Array(keys)),
    ])
}

fn decode_table(value: &PackedValue) -> Result<Table> {
    let name = field_str(value, "name")?.to_string();
    let columns = field_array(value, "columns")?.iter().map(decode_column).collect::<Result<Vec<_>>>()?;
    let primary_key_columns = field_array(value, "primary_key_columns")?
        .iter()
        .map(|v| codec::expect_i64(v).map(|i| i as usize))
        .collect::<Result<Vec<_>>>()?;
    let primary_key_kind = field_str(value, "primary_key_type")?;
    let primary_key_kind = PrimaryKeyKind::from_str(primary_key_kind).unwrap_or_else(|| {
        tracing::warn!(kind = primary_key_kind, "unknown primary_key_type read from peer, treating as NoAvailableKey");
        PrimaryKeyKind::NoAvailableKey
    });
    let keys = field_array(value, "keys")?.iter().map(decode_key).collect::<Result<Vec<_>>>()?;
    Ok(Table { name, columns, primary_key_columns, primary_key_kind, keys })
}

fn encode_column(column: &Column) -> PackedValue {
    map(vec![
        ("name", PackedValue::from(column.name.as_str())),
        ("nullable", PackedValue::Bool(column.nullable)),
        ("column_type", PackedValue::from(column.kind.as_str())),
        ("size", PackedValue::Int(column.size)),
        ("scale", PackedValue::Int(column.scale)),
        ("default_type", PackedValue::from(column.default_kind.as_str())),
        ("default_value", column.default_value.clone().into()),
        ("flags", PackedValue::from_iter(column.flags.set_names())),
        ("type_restriction", column.type_restriction.clone().into()),
        ("reference_system", column.reference_system.clone().into()),
        ("enumeration_values", PackedValue::from_iter(column.enumeration_values.clone())),
        ("db_type_def", column.db_type_def.clone().into()),
    ])
}

fn decode_column(value: &PackedValue) -> Result<Column> {
    let name = field_str(value, "name")?.to_string();
    let kind_name = field_str(value, "column_type")?;
    let kind = ColumnKind::from_str(kind_name).unwrap_or_else(|| {
        tracing::warn!(kind = kind_name, "unknown column_type read from peer, treating as Unknown");
        ColumnKind::Unknown
    });
    let default_kind_name = field_str(value, "default_type")?;
    let default_kind = DefaultKind::from_str(default_kind_name).unwrap_or(DefaultKind::NoDefault);
    let flag_names: Vec<&str> =
        field_array(value, "flags")?.iter().filter_map(PackedValue::as_str).collect();

    Ok(Column {
        name,
        nullable: field_bool(value, "nullable")?,
        kind,
        size: field_i64(value, "size")?,
        scale: field_i64(value, "scale")?,
        default_kind,
        default_value: field_opt_string(value, "default_value"),
        flags: ColumnFlags::from_names(flag_names),
        type_restriction: field_opt_string(value, "type_restriction"),
        reference_system: field_opt_string(value, "reference_system"),
        enumeration_values: field_array(value, "enumeration_values")?
            .iter()
            .filter_map(PackedValue::as_str)
            .map(str::to_string)
            .collect(),
        db_type_def: field_opt_string(value, "db_type_def"),
    })
}

fn encode_key(key: &Key) -> PackedValue {
    let columns: Vec<PackedValue> = key.columns.iter().map(|&i| PackedValue::Int(i as i64)).collect();
    map(vec![
        ("name", PackedValue::from(key.name.as_str())),
        ("key_type", PackedValue::from(key.kind.as_str())),
        ("columns", PackedValue::Array(columns)),
    ])
}

fn decode_key(value: &PackedValue) -> Result<Key> {
    let name = field_str(value, "name")?.to_string();
    let kind_name = field_str(value, "key_type")?;
    let kind = KeyKind::from_str(kind_name)
        .ok_or_else(|| Error::Codec(CodecError::TypeMismatch { expected: "known key_type", found: "unknown" }))?;
    let columns = field_array(value, "columns")?
        .iter()
        .map(|v| codec::expect_i64(v).map(|i| i as usize))
        .collect::<Result<Vec<_>>>()?;
    Ok(Key { name, kind, columns })
}

fn find_field<'a>(value: &'a PackedValue, key: &str) -> Option<&'a PackedValue> {
    value.map_get(key)
}

fn field_str<'a>(value: &'a PackedValue, key: &'static str) -> Result<&'a str> {
    find_field(value, key)
        .and_then(PackedValue::as_str)
        .ok_or(Error::Codec(CodecError::TypeMismatch { expected: key, found: "missing or non-string" }))
}

fn field_opt_string(value: &PackedValue, key: &str) -> Option<String> {
    find_field(value, key).filter(|v| !v.is_nil()).and_then(PackedValue::as_str).map(str::to_string)
}

fn field_bool(value: &PackedValue, key: &'static str) -> Result<bool> {
    find_field(value, key)
        .and_then(PackedValue::as_bool)
        .ok_or(Error::Codec(CodecError::TypeMismatch { expected: key, found: "missing or non-bool" }))
}

fn field_i64(value: &PackedValue, key: &'static str) -> Result<i64> {
    find_field(value, key)
        .and_then(PackedValue::as_i64)
        .ok_or(Error::Codec(CodecError::TypeMismatch { expected: key, found: "missing or non-int" }))
}

fn field_array<'a>(value: &'a PackedValue, key: &'static str) -> Result<&'a [PackedValue]> {
    find_field(value, key)
        .and_then(PackedValue::as_array)
        .ok_or(Error::Codec(CodecError::TypeMismatch { expected: key, found: "missing or non-array" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnKind, PrimaryKeyKind};

    fn sample_database() -> Database {
        let mut table = Table::new("widgets");
        let mut id = Column::new("id", ColumnKind::SignedInt);
        id.nullable = false;
        id.default_kind = DefaultKind::Sequence;
        table.columns.push(id);
        let mut name = Column::new("name", ColumnKind::VarChar);
        name.size = 255;
        name.flags.set_time_zone(false);
        table.columns.push(name);
        let mut geom = Column::new("location", ColumnKind::Spatial);
        geom.type_restriction = Some("point".to_string());
        geom.reference_system = Some("4326".to_string());
        geom.flags.set_simple_geometry(true);
        table.columns.push(geom);
        table.primary_key_columns = vec![0];
        table.primary_key_kind = PrimaryKeyKind::ExplicitPrimaryKey;
        table.keys.push(Key { name: "widgets_name_idx".into(), kind: KeyKind::Standard, columns: vec![1] });

        let mut db = Database::new();
        db.tables.push(table);
        db
    }

    #[test]
    fn schema_round_trips_through_packed_value() {
        let db = sample_database();
        let encoded = encode_database(&db);
        let decoded = decode_database(&encoded).unwrap();
        assert_eq!(db, decoded);
    }

    #[test]
    fn schema_round_trips_through_the_byte_codec_too() {
        let db = sample_database();
        let encoded = encode_database(&db);
        let mut buf = Vec::new();
        codec::pack_value(&mut buf, &encoded);
        let mut r = codec::Reader::new(&buf);
        let value = codec::unpack_value(&mut r).unwrap();
        let decoded = decode_database(&value).unwrap();
        assert_eq!(db, decoded);
    }

    #[test]
    fn unknown_map_keys_are_ignored_on_read() {
        let db = sample_database();
        let mut encoded = encode_database(&db);
        if let PackedValue::Map(entries) = &mut encoded {
            entries.push((PackedValue::from("future_field"), PackedValue::Bool(true)));
        }
        let decoded = decode_database(&encoded).unwrap();
        assert_eq!(db, decoded);
    }
}
