//! MySQL schema introspection (spec.md §4.6): builds a canonical
//! [`Database`] from `information_schema`, mirroring
//! [`kitchensync_postgres::introspect`]'s four steps but against MySQL's
//! catalog views. Scoped to `TABLE_SCHEMA = DATABASE()` — the database
//! named in the connection's own config, same as every other statement
//! this adapter issues.

use std::collections::HashMap;

use asupersync::{Cx, Outcome};
use kitchensync_adapter::driver::{Result, Row, Value};
use kitchensync_schema::{Column, ColumnKind, Database, Key, KeyKind, PrimaryKeyKind, Table};

use crate::async_connection::SharedMySqlConnection;
use crate::typemap::{self, RawColumnType};

fn text(row: &Row, name: &str) -> Option<String> {
    match row.get_by_name(name) {
        Some(Value::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn i64_col(row: &Row, name: &str) -> Option<i64> {
    row.get_by_name(name).and_then(Value::as_i64)
}

fn bool_col(row: &Row, name: &str) -> bool {
    matches!(row.get_by_name(name), Some(Value::Bool(true)) | Some(Value::TinyInt(1)) | Some(Value::BigInt(1)))
}

async fn rows(conn: &SharedMySqlConnection, cx: &Cx, sql: &str) -> Result<Vec<Row>> {
    match conn.query(cx, sql, &[]).await {
        Outcome::Ok(rows) => Ok(rows),
        Outcome::Err(e) => Err(e),
        Outcome::Cancelled(_) | Outcome::Panicked(_) => Err(kitchensync_adapter::driver::protocol_error(
            "introspection query cancelled or panicked",
        )),
    }
}

/// Build the full canonical [`Database`] from `information_schema`,
/// largest tables first by on-disk size (same heuristic as Postgres's
/// introspection, spec.md §4.5) so bulk synchronization starts on the
/// heaviest tables.
pub async fn introspect(conn: &SharedMySqlConnection, cx: &Cx) -> Result<Database> {
    let table_rows = rows(
        conn,
        cx,
        "SELECT TABLE_NAME AS name \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY (DATA_LENGTH + INDEX_LENGTH) DESC, TABLE_NAME ASC",
    )
    .await?;

    let mut database = Database::default();
    for table_row in &table_rows {
        let name = text(table_row, "name").unwrap_or_default();
        let mut table = Table::new(&name);
        load_columns(conn, cx, &name, &mut table).await?;
        load_primary_key(conn, cx, &name, &mut table).await?;
        load_other_keys(conn, cx, &name, &mut table).await?;
        database.tables.push(table);
    }
    Ok(database)
}

async fn load_columns(conn: &SharedMySqlConnection, cx: &Cx, table_name: &str, table: &mut Table) -> Result<()> {
    let sql = format!(
        "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS column_type, DATA_TYPE AS data_type, \
                IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default, EXTRA AS extra, \
                CHARACTER_MAXIMUM_LENGTH AS char_max_length, NUMERIC_PRECISION AS numeric_precision, \
                NUMERIC_SCALE AS numeric_scale \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{table_name}' \
         ORDER BY ORDINAL_POSITION",
    );
    let rows = rows(conn, cx, &sql).await?;
    for row in &rows {
        let mut column = Column::new(text(&row, "name").unwrap_or_default(), ColumnKind::Unknown);
        column.nullable = text(&row, "is_nullable").as_deref() == Some("YES");

        let data_type = text(&row, "data_type").unwrap_or_default();
        let column_type = text(&row, "column_type").unwrap_or_default();
        let extra = text(&row, "extra").unwrap_or_default();
        let raw = RawColumnType {
            data_type: &data_type,
            column_type: &column_type,
            char_max_length: i64_col(&row, "char_max_length"),
            numeric_precision: i64_col(&row, "numeric_precision"),
            numeric_scale: i64_col(&row, "numeric_scale"),
            extra: &extra,
        };
        typemap::apply_column_type(&mut column, &raw);

        let default_expr = text(&row, "column_default");
        let (kind, value) = typemap::parse_default(default_expr.as_deref(), &extra);
        column.default_kind = kind;
        column.default_value = value;

        table.columns.push(column);
    }
    Ok(())
}

async fn load_primary_key(conn: &SharedMySqlConnection, cx: &Cx, table_name: &str, table: &mut Table) -> Result<()> {
    let sql = format!(
        "SELECT COLUMN_NAME AS name \
         FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{table_name}' AND CONSTRAINT_NAME = 'PRIMARY' \
         ORDER BY ORDINAL_POSITION",
    );
    let rows = rows(conn, cx, &sql).await?;
    if rows.is_empty() {
        table.primary_key_kind = PrimaryKeyKind::NoAvailableKey;
        return Ok(());
    }
    let mut indices = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = text(row, "name").unwrap_or_default();
        if let Some(idx) = table.index_of_column(&name) {
            indices.push(idx);
        }
    }
    table.primary_key_columns = indices;
    table.primary_key_kind = PrimaryKeyKind::ExplicitPrimaryKey;
    Ok(())
}

async fn load_other_keys(conn: &SharedMySqlConnection, cx: &Cx, table_name: &str, table: &mut Table) -> Result<()> {
    let sql = format!(
        "SELECT INDEX_NAME AS name, NON_UNIQUE AS non_unique, INDEX_TYPE AS index_type, \
                COLUMN_NAME AS column_name, SEQ_IN_INDEX AS seq \
         FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{table_name}' AND INDEX_NAME <> 'PRIMARY' \
         ORDER BY INDEX_NAME, SEQ_IN_INDEX",
    );
    let rows = rows(conn, cx, &sql).await?;

    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, (bool, bool, Vec<String>)> = HashMap::new();
    for row in &rows {
        let name = text(row, "name").unwrap_or_default();
        let non_unique = i64_col(row, "non_unique").unwrap_or(1) != 0;
        let index_type = text(row, "index_type").unwrap_or_default().to_ascii_uppercase();
        let column_name = text(row, "column_name").unwrap_or_default();
        let entry = by_name.entry(name.clone()).or_insert_with(|| {
            order.push(name.clone());
            (!non_unique, index_type == "SPATIAL", Vec::new())
        });
        entry.2.push(column_name);
    }

    for name in order {
        let (is_unique, is_spatial, columns) = by_name.remove(&name).unwrap_or_default();
        let kind = if is_spatial {
            KeyKind::Spatial
        } else if is_unique {
            KeyKind::Unique
        } else {
            KeyKind::Standard
        };
        let column_indices = columns.iter().filter_map(|c| table.index_of_column(c)).collect();
        table.keys.push(Key { name, kind, columns: column_indices });
    }
    Ok(())
}
