//! [`PostgresAdapter`]: the concrete [`kitchensync_adapter::Adapter`]
//! implementation for PostgreSQL (spec component C5). Wraps a live
//! [`SharedPgConnection`] and adds everything the endpoint driver (C8)
//! needs beyond raw query execution — introspection, transaction and
//! snapshot control, escaping, and DDL rendering.

use asupersync::{Cx, Outcome};

use kitchensync_adapter::driver::{self, Row};
use kitchensync_adapter::{Adapter, RowHandler, SupportedFlags};
use kitchensync_core::error::{Error as CoreError, Result as CoreResult};
use kitchensync_schema::{Column, ColumnIndex, ColumnKind, Database, Table};

use crate::async_connection::SharedPgConnection;
use crate::config::PgConfig;
use crate::{escape, introspect, typemap};

/// Live PostgreSQL connection plus the kitchen-sync-specific behavior
/// (spec.md §4.4) layered on top of it.
pub struct PostgresAdapter {
    conn: SharedPgConnection,
}

impl PostgresAdapter {
    pub async fn connect(cx: &Cx, config: PgConfig) -> CoreResult<Self> {
        match SharedPgConnection::connect(cx, config).await {
            Outcome::Ok(conn) => Ok(Self { conn }),
            Outcome::Err(e) => Err(e.into_core_error()),
            Outcome::Cancelled(_) | Outcome::Panicked(_) => Err(CoreError::ConnectionLost),
        }
    }

    pub fn from_connection(conn: SharedPgConnection) -> Self {
        Self { conn }
    }
}

/// Fold a driver-level `Outcome` into the session-wide `Result` an
/// [`Adapter`] method returns.
fn fold<T>(outcome: Outcome<T, driver::Error>) -> CoreResult<T> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(e.into_core_error()),
        Outcome::Cancelled(_) | Outcome::Panicked(_) => Err(CoreError::ConnectionLost),
    }
}

async fn exec(conn: &SharedPgConnection, cx: &Cx, sql: &str) -> CoreResult<u64> {
    fold(conn.execute(cx, sql, &[]).await)
}

impl Adapter for PostgresAdapter {
    async fn database_schema(&mut self, cx: &Cx) -> CoreResult<Database> {
        introspect::introspect(&self.conn, cx).await.map_err(driver::Error::into_core_error)
    }

    fn convert_unsupported_schema(&self, peer_schema: &mut Database) {
        typemap::convert_unsupported_schema(peer_schema);
    }

    async fn start_read_transaction(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "START TRANSACTION READ ONLY ISOLATION LEVEL REPEATABLE READ").await?;
        Ok(())
    }

    async fn start_write_transaction(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "START TRANSACTION ISOLATION LEVEL READ COMMITTED").await?;
        Ok(())
    }

    async fn commit_transaction(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "COMMIT").await?;
        Ok(())
    }

    async fn rollback_transaction(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "ROLLBACK").await?;
        Ok(())
    }

    async fn export_snapshot(&mut self, cx: &Cx) -> CoreResult<String> {
        exec(&self.conn, cx, "START TRANSACTION READ ONLY ISOLATION LEVEL REPEATABLE READ").await?;
        let rows: Vec<Row> = fold(self.conn.query(cx, "SELECT pg_export_snapshot() AS token", &[]).await)?;
        let token = rows
            .first()
            .and_then(|row| row.get_by_name("token"))
            .and_then(driver::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CoreError::database("pg_export_snapshot() returned no row"))?;
        Ok(token)
    }

    async fn import_snapshot(&mut self, cx: &Cx, token: &str) -> CoreResult<()> {
        exec(&self.conn, cx, "START TRANSACTION READ ONLY ISOLATION LEVEL REPEATABLE READ").await?;
        let sql = format!("SET TRANSACTION SNAPSHOT {}", escape::escape_string(token));
        exec(&self.conn, cx, &sql).await?;
        Ok(())
    }

    async fn unhold_snapshot(&mut self, _cx: &Cx) -> CoreResult<()> {
        // Postgres snapshots don't need a held lock to stay importable.
        Ok(())
    }

    async fn disable_referential_integrity(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "SET CONSTRAINTS ALL DEFERRED").await?;
        Ok(())
    }

    async fn enable_referential_integrity(&mut self, _cx: &Cx) -> CoreResult<()> {
        Ok(())
    }

    async fn execute(&mut self, cx: &Cx, sql: &str) -> CoreResult<u64> {
        exec(&self.conn, cx, sql).await
    }

    async fn query<'a>(&'a mut self, cx: &'a Cx, sql: &'a str, row_handler: &'a mut RowHandler<'a>) -> CoreResult<()> {
        let rows: Vec<Row> = fold(self.conn.query(cx, sql, &[]).await)?;
        for row in &rows {
            row_handler(row)?;
        }
        Ok(())
    }

    fn escape_string(&self, s: &str) -> String {
        escape::escape_string(s)
    }

    fn escape_bytea(&self, bytes: &[u8]) -> String {
        escape::escape_bytea(bytes)
    }

    fn escape_spatial(&self, wkb: &[u8]) -> String {
        escape::escape_spatial(wkb)
    }

    fn escape_column_value(&self, column: &Column, value: &kitchensync_core::value::PackedValue) -> String {
        escape::escape_column_value(column, value)
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(name)
    }

    fn supported_flags(&self) -> SupportedFlags {
        let mut flags = SupportedFlags::empty();
        flags.set_time_zone(true);
        flags.set_simple_geometry(true);
        flags.set_identity_generated_always(true);
        flags
    }

    fn column_definition(&self, table: &Table, column_index: ColumnIndex) -> String {
        let column = &table.columns[column_index];
        let mut def = format!("{} {}", self.quote_identifier(&column.name), pg_type_sql(column));
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }
}

/// Double any embedded `"` and wrap in double quotes, Postgres's
/// identifier-quoting rule (spec.md §4.4 `quote_identifier`).
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a [`ColumnKind`] back into a PostgreSQL type name, the inverse
/// of `typemap::parse_format_type` for the subset of shapes Kitchen Sync
/// ever needs to emit DDL for.
fn pg_type_sql(column: &Column) -> String {
    match column.kind {
        ColumnKind::Bool => "boolean".to_string(),
        ColumnKind::SignedInt | ColumnKind::UnsignedInt => match column.size {
            2 => "smallint".to_string(),
            8 => "bigint".to_string(),
            _ => "integer".to_string(),
        },
        ColumnKind::Real => if column.size == 4 { "real".to_string() } else { "double precision".to_string() },
        ColumnKind::Decimal => {
            if column.size == 0 {
                "numeric".to_string()
            } else {
                format!("numeric({}, {})", column.size, column.scale)
            }
        }
        ColumnKind::VarChar => format!("character varying({})", column.size),
        ColumnKind::FixedChar => format!("character({})", column.size),
        ColumnKind::Text => "text".to_string(),
        ColumnKind::Blob => "bytea".to_string(),
        ColumnKind::Uuid => "uuid".to_string(),
        ColumnKind::Json => "jsonb".to_string(),
        ColumnKind::Date => "date".to_string(),
        ColumnKind::Time => {
            if column.flags.time_zone() { "time with time zone".to_string() } else { "time without time zone".to_string() }
        }
        ColumnKind::DateTime => {
            if column.flags.time_zone() {
                "timestamp with time zone".to_string()
            } else {
                "timestamp without time zone".to_string()
            }
        }
        ColumnKind::Spatial => match (&column.type_restriction, &column.reference_system) {
            (Some(subtype), Some(srid)) => format!("geometry({subtype},{srid})"),
            (Some(subtype), None) => format!("geometry({subtype})"),
            _ => "geometry".to_string(),
        },
        ColumnKind::Enum => "text".to_string(),
        ColumnKind::Unknown => column.db_type_def.clone().unwrap_or_else(|| "text".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitchensync_schema::Column;

    #[test]
    fn quote_identifier_doubles_embedded_quotes() {
        assert_eq!(quote_identifier(r#"weird"name"#), "\"weird\"\"name\"");
    }

    #[test]
    fn pg_type_sql_renders_varchar_with_length() {
        let mut col = Column::new("name", ColumnKind::VarChar);
        col.size = 32;
        assert_eq!(pg_type_sql(&col), "character varying(32)");
    }

    #[test]
    fn pg_type_sql_renders_geometry_with_subtype_and_srid() {
        let mut col = Column::new("location", ColumnKind::Spatial);
        col.type_restriction = Some("point".to_string());
        col.reference_system = Some("4326".to_string());
        assert_eq!(pg_type_sql(&col), "geometry(point,4326)");
    }
}
