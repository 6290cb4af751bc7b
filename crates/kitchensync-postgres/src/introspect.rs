//! PostgreSQL schema introspection (spec.md §4.5 "Introspection"): the
//! catalog queries that build a canonical [`Database`] from a live
//! connection, in the five steps the spec lays out.

use std::collections::HashMap;

use asupersync::{Cx, Outcome};
use kitchensync_adapter::driver::{Result, Row, Value};
use kitchensync_schema::{Column, Database, DefaultKind, Key, KeyKind, PrimaryKeyKind, Table};

use crate::async_connection::SharedPgConnection;
use crate::typemap;

fn text(row: &Row, name: &str) -> Option<String> {
    match row.get_by_name(name) {
        Some(Value::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn bool_col(row: &Row, name: &str) -> bool {
    matches!(row.get_by_name(name), Some(Value::Bool(true)))
}

fn i64_col(row: &Row, name: &str) -> i64 {
    row.get_by_name(name).and_then(Value::as_i64).unwrap_or(0)
}

async fn rows(conn: &SharedPgConnection, cx: &Cx, sql: &str) -> Result<Vec<Row>> {
    match conn.query(cx, sql, &[]).await {
        Outcome::Ok(rows) => Ok(rows),
        Outcome::Err(e) => Err(e),
        Outcome::Cancelled(_) | Outcome::Panicked(_) => Err(kitchensync_adapter::driver::protocol_error(
            "introspection query cancelled or panicked",
        )),
    }
}

/// Build the full canonical [`Database`] from the catalog, following
/// spec.md §4.5's five steps in order.
pub async fn introspect(conn: &SharedPgConnection, cx: &Cx) -> Result<Database> {
    let geometry_oids = geometry_oids(conn, cx).await?;

    let table_rows = rows(
        conn,
        cx,
        "SELECT c.relname AS name, pg_relation_size(c.oid) AS size \
         FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind = 'r' AND pg_table_is_visible(c.oid) \
         ORDER BY pg_relation_size(c.oid) DESC, c.relname ASC",
    )
    .await?;

    let mut database = Database::default();
    for table_row in &table_rows {
        let name = text(table_row, "name").unwrap_or_default();
        let mut table = Table::new(&name);
        load_columns(conn, cx, &name, &mut table, &geometry_oids).await?;
        load_primary_key(conn, cx, &name, &mut table).await?;
        load_other_keys(conn, cx, &name, &mut table).await?;
        database.tables.push(table);
    }
    Ok(database)
}

async fn geometry_oids(conn: &SharedPgConnection, cx: &Cx) -> Result<std::collections::HashSet<i64>> {
    let rows = rows(conn, cx, "SELECT oid::bigint AS oid FROM pg_type WHERE typname = 'geometry'").await?;
    Ok(rows.iter().map(|r| i64_col(r, "oid")).collect())
}

async fn load_columns(
    conn: &SharedPgConnection,
    cx: &Cx,
    table_name: &str,
    table: &mut Table,
    _geometry_oids: &std::collections::HashSet<i64>,
) -> Result<()> {
    let sql = format!(
        "SELECT a.attname AS name, \
                format_type(a.atttypid, a.atttypmod) AS type_str, \
                NOT a.attnotnull AS nullable, \
                (ad.adbin IS NOT NULL) AS has_default, \
                pg_get_expr(ad.adbin, ad.adrelid) AS default_expr \
         FROM pg_attribute a \
         JOIN pg_class c ON c.oid = a.attrelid \
         JOIN pg_type t ON t.oid = a.atttypid \
         LEFT JOIN pg_attrdef ad ON ad.adrelid = a.attrelid AND ad.adnum = a.attnum \
         WHERE c.relname = '{table_name}' AND a.attnum > 0 AND NOT a.attisdropped \
         ORDER BY a.attnum",
    );
    let rows = rows(conn, cx, &sql).await?;
    for row in &rows {
        let mut column = Column::new(text(&row, "name").unwrap_or_default(), kitchensync_schema::ColumnKind::Unknown);
        column.nullable = bool_col(&row, "nullable");
        if let Some(type_str) = text(&row, "type_str") {
            typemap::apply_format_type(&mut column, &type_str);
        }
        if bool_col(&row, "has_default") {
            if let Some(expr) = text(&row, "default_expr") {
                let (kind, value) = typemap::parse_default_expr(&expr);
                column.default_kind = kind;
                column.default_value = value;
            }
        } else {
            column.default_kind = DefaultKind::NoDefault;
        }
        table.columns.push(column);
    }
    Ok(())
}

async fn load_primary_key(conn: &SharedPgConnection, cx: &Cx, table_name: &str, table: &mut Table) -> Result<()> {
    let sql = format!(
        "SELECT kcu.column_name AS name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name AND kcu.table_name = tc.table_name \
         WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = '{table_name}' \
         ORDER BY kcu.ordinal_position",
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

async fn load_other_keys(conn: &SharedPgConnection, cx: &Cx, table_name: &str, table: &mut Table) -> Result<()> {
    let sql = format!(
        "SELECT ic.relname AS name, i.indisunique AS is_unique, am.amname AS access_method, \
                array_agg(a.attname ORDER BY k.ord) AS columns \
         FROM pg_index i \
         JOIN pg_class c ON c.oid = i.indrelid \
         JOIN pg_class ic ON ic.oid = i.indexrelid \
         JOIN pg_am am ON am.oid = ic.relam \
         JOIN unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
         JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum \
         WHERE c.relname = '{table_name}' AND NOT i.indisprimary \
         GROUP BY ic.relname, i.indisunique, am.amname",
    );
    let rows = rows(conn, cx, &sql).await?;
    let mut names: HashMap<String, usize> = HashMap::new();
    for column in &table.columns {
        names.insert(column.name.clone(), names.len());
    }
    for row in &rows {
        let name = text(row, "name").unwrap_or_default();
        let is_unique = bool_col(row, "is_unique");
        let access_method = text(row, "access_method").unwrap_or_default();
        let kind = if access_method == "gist" || access_method == "spgist" {
            KeyKind::Spatial
        } else if is_unique {
            KeyKind::Unique
        } else {
            KeyKind::Standard
        };
        let columns = match row.get_by_name("columns") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::Text(s) => table.index_of_column(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        table.keys.push(Key { name, kind, columns });
    }
    Ok(())
}
