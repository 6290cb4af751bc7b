//! [`MySqlAdapter`]: the concrete [`kitchensync_adapter::Adapter`]
//! implementation for MySQL (spec component C6). Symmetric in structure
//! to [`kitchensync_postgres::adapter::PostgresAdapter`]: wraps a live
//! [`SharedMySqlConnection`] and adds introspection, transaction and
//! snapshot control, escaping, and DDL rendering on top of it.

use asupersync::{Cx, Outcome};

use kitchensync_adapter::driver::{self, Row};
use kitchensync_adapter::{Adapter, RowHandler, SupportedFlags};
use kitchensync_core::error::{Error as CoreError, Result as CoreResult};
use kitchensync_core::value::PackedValue;
use kitchensync_schema::{Column, ColumnIndex, ColumnKind, Database, Table};

use crate::async_connection::SharedMySqlConnection;
use crate::config::MySqlConfig;
use crate::{escape, introspect, typemap};

/// Live MySQL connection plus the kitchen-sync-specific behavior
/// (spec.md §4.4) layered on top of it.
pub struct MySqlAdapter {
    conn: SharedMySqlConnection,
    /// Set by [`MySqlAdapter::export_snapshot`]; released by
    /// [`MySqlAdapter::unhold_snapshot`] (spec.md §4.6's
    /// `FLUSH TABLES WITH READ LOCK` + consistent-snapshot dance).
    holding_read_lock: bool,
}

impl MySqlAdapter {
    pub async fn connect(cx: &Cx, config: MySqlConfig) -> CoreResult<Self> {
        match SharedMySqlConnection::connect(cx, config).await {
            Outcome::Ok(conn) => Ok(Self { conn, holding_read_lock: false }),
            Outcome::Err(e) => Err(e.into_core_error()),
            Outcome::Cancelled(_) | Outcome::Panicked(_) => Err(CoreError::ConnectionLost),
        }
    }

    pub fn from_connection(conn: SharedMySqlConnection) -> Self {
        Self { conn, holding_read_lock: false }
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

async fn exec(conn: &SharedMySqlConnection, cx: &Cx, sql: &str) -> CoreResult<u64> {
    fold(conn.execute(cx, sql, &[]).await)
}

impl Adapter for MySqlAdapter {
    async fn database_schema(&mut self, cx: &Cx) -> CoreResult<Database> {
        introspect::introspect(&self.conn, cx).await.map_err(driver::Error::into_core_error)
    }

    fn convert_unsupported_schema(&self, peer_schema: &mut Database) {
        typemap::convert_unsupported_schema(peer_schema);
    }

    async fn start_read_transaction(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ").await?;
        exec(&self.conn, cx, "START TRANSACTION READ ONLY").await?;
        Ok(())
    }

    async fn start_write_transaction(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "SET TRANSACTION ISOLATION LEVEL READ COMMITTED").await?;
        exec(&self.conn, cx, "START TRANSACTION").await?;
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

    /// spec.md §4.6: `FLUSH TABLES WITH READ LOCK` establishes a
    /// server-wide consistent point, then `START TRANSACTION WITH
    /// CONSISTENT SNAPSHOT` pins this connection's view to it. The lock
    /// is held until [`MySqlAdapter::unhold_snapshot`] releases it — a
    /// second same-engine process opening a transaction with consistent
    /// snapshot in between would observe the same data.
    async fn export_snapshot(&mut self, cx: &Cx) -> CoreResult<String> {
        exec(&self.conn, cx, "FLUSH TABLES WITH READ LOCK").await?;
        self.holding_read_lock = true;
        exec(&self.conn, cx, "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ").await?;
        exec(&self.conn, cx, "START TRANSACTION WITH CONSISTENT SNAPSHOT").await?;
        let rows: Vec<Row> =
            fold(self.conn.query(cx, "SHOW MASTER STATUS", &[]).await).unwrap_or_default();
        let token = rows
            .first()
            .and_then(|row| row.get_by_name("File"))
            .and_then(driver::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "consistent-snapshot".to_string());
        Ok(token)
    }

    /// MySQL's consistent snapshot has no importable token another
    /// connection can present — the read lock this adapter holds for
    /// the duration of [`MySqlAdapter::export_snapshot`] is what gives a
    /// second process a consistent view to start its own snapshot from,
    /// so the import side just opens its own consistent-snapshot
    /// transaction.
    async fn import_snapshot(&mut self, cx: &Cx, _token: &str) -> CoreResult<()> {
        exec(&self.conn, cx, "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ").await?;
        exec(&self.conn, cx, "START TRANSACTION WITH CONSISTENT SNAPSHOT").await?;
        Ok(())
    }

    async fn unhold_snapshot(&mut self, cx: &Cx) -> CoreResult<()> {
        if self.holding_read_lock {
            exec(&self.conn, cx, "UNLOCK TABLES").await?;
            self.holding_read_lock = false;
        }
        Ok(())
    }

    async fn disable_referential_integrity(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "SET FOREIGN_KEY_CHECKS=0").await?;
        exec(&self.conn, cx, "SET UNIQUE_CHECKS=0").await?;
        Ok(())
    }

    async fn enable_referential_integrity(&mut self, cx: &Cx) -> CoreResult<()> {
        exec(&self.conn, cx, "SET UNIQUE_CHECKS=1").await?;
        exec(&self.conn, cx, "SET FOREIGN_KEY_CHECKS=1").await?;
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

    fn escape_column_value(&self, column: &Column, value: &PackedValue) -> String {
        escape::escape_column_value(column, value)
    }

    fn quote_identifier(&self, name: &str) -> String {
        escape::quote_identifier(name)
    }

    fn supported_flags(&self) -> SupportedFlags {
        let mut flags = SupportedFlags::empty();
        flags.set_mysql_timestamp(true);
        flags.set_mysql_on_update_timestamp(true);
        flags.set_identity_generated_always(true);
        flags
    }

    fn column_definition(&self, table: &Table, column_index: ColumnIndex) -> String {
        let column = &table.columns[column_index];
        let mut def = format!("{} {}", self.quote_identifier(&column.name), mysql_type_sql(column));
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if column.flags.mysql_on_update_timestamp() {
            def.push_str(" ON UPDATE CURRENT_TIMESTAMP");
        }
        def
    }
}

/// Render a [`ColumnKind`] back into a MySQL type name — the inverse of
/// `typemap`'s `information_schema` parsing for the subset of shapes
/// Kitchen Sync ever needs to emit DDL for.
fn mysql_type_sql(column: &Column) -> String {
    match column.kind {
        ColumnKind::Bool => "tinyint(1)".to_string(),
        ColumnKind::SignedInt => match column.size {
            1 => "tinyint".to_string(),
            2 => "smallint".to_string(),
            4 => "int".to_string(),
            _ => "bigint".to_string(),
        },
        ColumnKind::UnsignedInt => match column.size {
            1 => "tinyint unsigned".to_string(),
            2 => "smallint unsigned".to_string(),
            4 => "int unsigned".to_string(),
            _ => "bigint unsigned".to_string(),
        },
        ColumnKind::Real => if column.size == 4 { "float".to_string() } else { "double".to_string() },
        ColumnKind::Decimal => format!("decimal({}, {})", column.size.max(1), column.scale),
        ColumnKind::VarChar => format!("varchar({})", column.size),
        ColumnKind::FixedChar => format!("char({})", column.size),
        ColumnKind::Text => if column.size == 0 { "text".to_string() } else { format!("varchar({})", column.size) },
        ColumnKind::Blob => if column.size == 0 { "blob".to_string() } else { format!("varbinary({})", column.size) },
        ColumnKind::Uuid => "char(36)".to_string(),
        ColumnKind::Json => "json".to_string(),
        ColumnKind::Date => "date".to_string(),
        ColumnKind::Time => "time".to_string(),
        ColumnKind::DateTime => "datetime".to_string(),
        ColumnKind::Spatial => match &column.type_restriction {
            Some(subtype) => subtype.to_uppercase(),
            None => "geometry".to_string(),
        },
        ColumnKind::Enum => {
            let values: Vec<String> = column.enumeration_values.iter().map(|v| format!("'{v}'")).collect();
            format!("enum({})", values.join(","))
        }
        ColumnKind::Unknown => column.db_type_def.clone().unwrap_or_else(|| "text".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitchensync_schema::Column;

    #[test]
    fn mysql_type_sql_renders_unsigned_int_with_width() {
        let mut col = Column::new("count", ColumnKind::UnsignedInt);
        col.size = 4;
        assert_eq!(mysql_type_sql(&col), "int unsigned");
    }

    #[test]
    fn mysql_type_sql_renders_enum_values() {
        let mut col = Column::new("status", ColumnKind::Enum);
        col.enumeration_values = vec!["open".to_string(), "closed".to_string()];
        assert_eq!(mysql_type_sql(&col), "enum('open','closed')");
    }
}
