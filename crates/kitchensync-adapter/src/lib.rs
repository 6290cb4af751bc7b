//! The backend adapter contract every Kitchen Sync engine implements
//! (spec component C4): introspection, transaction/snapshot control,
//! statement execution, value/identifier escaping and the row-pack
//! contract that turns a live query result into wire-ready
//! [`PackedValue`] cells.
//!
//! [`kitchensync-postgres`] and [`kitchensync-mysql`] each provide one
//! concrete [`Adapter`] implementation; [`kitchensync-driver`]'s
//! endpoint loop is generic over it.

pub mod driver;

use std::future::Future;

use kitchensync_core::value::PackedValue;
use kitchensync_core::{Cx, Outcome};
use kitchensync_schema::{ColumnKind, Database, Table};

/// Which column flags (spec.md §3 `ColumnFlags`) an engine can
/// faithfully persist. Bits the destination doesn't support are simply
/// dropped by the caller before DDL/data is written, not rejected.
pub use kitchensync_schema::model::ColumnFlags as SupportedFlags;

/// A single decoded row handed to a [`Adapter::query`] row handler. The
/// handler sees the adapter's native [`driver::Row`] type (engine
/// column metadata plus [`driver::Value`] cells) and is responsible for
/// converting it to the wire's [`PackedValue`] shape per spec.md §4.4's
/// row-pack contract (see [`pack_row`]).
pub type RowHandler<'a> = dyn FnMut(&driver::Row) -> kitchensync_core::Result<()> + Send + 'a;

/// The uniform interface every engine-specific adapter implements.
///
/// Every operation takes a `Cx` for structured concurrency (this
/// workspace's async convention, see `kitchensync-driver`'s design
/// notes) even though the endpoint driver never holds more than one
/// outstanding adapter call at a time (spec.md §5).
pub trait Adapter: Send + Sync {
    /// Introspect the live connection into a canonical [`Database`].
    /// Must produce a value satisfying every invariant in spec.md §3.
    fn database_schema(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<Database>> + Send;

    /// Apply engine-specific lossy normalization to a *peer's* schema
    /// before it is compared with this adapter's own
    /// (spec.md §4.4/§4.5/§4.6). A no-op for a same-engine peer.
    fn convert_unsupported_schema(&self, peer_schema: &mut Database);

    fn start_read_transaction(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<()>> + Send;
    fn start_write_transaction(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<()>> + Send;
    fn commit_transaction(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<()>> + Send;
    fn rollback_transaction(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<()>> + Send;

    /// Export a snapshot token another same-engine process can import
    /// for a consistent view. May begin the read transaction as a side
    /// effect.
    fn export_snapshot(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<String>> + Send;
    /// Begin a read transaction pinned to a snapshot token from
    /// [`Adapter::export_snapshot`].
    fn import_snapshot(&mut self, cx: &Cx, token: &str) -> impl Future<Output = kitchensync_core::Result<()>> + Send;
    /// Release any lock held solely to keep a snapshot importable.
    /// A no-op on engines that need no such lock.
    fn unhold_snapshot(&mut self, cx: &Cx) -> impl Future<Output = kitchensync_core::Result<()>> + Send;

    fn disable_referential_integrity(&mut self, cx: &Cx)
    -> impl Future<Output = kitchensync_core::Result<()>> + Send;
    fn enable_referential_integrity(&mut self, cx: &Cx)
    -> impl Future<Output = kitchensync_core::Result<()>> + Send;

    /// Side-effecting SQL; returns the engine-reported row count.
    fn execute(&mut self, cx: &Cx, sql: &str) -> impl Future<Output = kitchensync_core::Result<u64>> + Send;

    /// Iterate a query's rows, calling `row_handler` once per row in
    /// order. The handler receives each row before the next is
    /// fetched — there is no buffering contract beyond what the
    /// engine's own wire protocol batches internally.
    fn query<'a>(
        &'a mut self,
        cx: &'a Cx,
        sql: &'a str,
        row_handler: &'a mut RowHandler<'a>,
    ) -> impl Future<Output = kitchensync_core::Result<()>> + Send + 'a;

    fn escape_string(&self, s: &str) -> String;
    fn escape_bytea(&self, bytes: &[u8]) -> String;
    /// `wkb` is canonical WKB-with-4-byte-SRID-prefix; engines that
    /// need the SRID split out (PostGIS) do so internally.
    fn escape_spatial(&self, wkb: &[u8]) -> String;
    /// Dispatches on `column.kind` to pick the right escaping rule —
    /// e.g. a `Spatial` column's value is WKB-with-SRID even though the
    /// wire cell is just bytes to the codec.
    fn escape_column_value(&self, column: &kitchensync_schema::Column, value: &PackedValue) -> String;

    /// Engine-specific identifier quoting (`"..."` vs `` `...` ``).
    fn quote_identifier(&self, name: &str) -> String;

    /// Which `ColumnFlags` bits this engine can faithfully persist.
    fn supported_flags(&self) -> SupportedFlags;

    /// Render the DDL fragment for one column, e.g. for a `CREATE
    /// TABLE`/`ALTER TABLE ADD COLUMN` the destination issues while
    /// applying a schema this adapter doesn't yet have.
    fn column_definition(&self, table: &Table, column_index: kitchensync_schema::ColumnIndex) -> String;
}

/// Map one decoded native cell to the wire's [`PackedValue`] per the
/// column-conversion table spec.md §4.4 describes: raw bytes, boolean,
/// signed int, decoded bytea, or geometry (already EWKB→WKB by the
/// caller), with NULL mapping to nil. This is the engine-agnostic half
/// of the row-pack contract; the engine-specific half is picking which
/// native [`driver::Value`] variant a given `ColumnKind` decodes to,
/// which lives in each adapter's own `rowpack` module.
pub fn pack_cell(kind: ColumnKind, value: &driver::Value) -> PackedValue {
    if value.is_null() {
        return PackedValue::Nil;
    }
    match (kind, value) {
        (ColumnKind::Bool, driver::Value::Bool(b)) => PackedValue::Bool(*b),
        (ColumnKind::SignedInt, _) => value.as_i64().map(PackedValue::Int).unwrap_or(PackedValue::Nil),
        (ColumnKind::UnsignedInt, driver::Value::BigInt(v)) => PackedValue::UInt(*v as u64),
        (ColumnKind::UnsignedInt, _) => value.as_i64().map(|v| PackedValue::UInt(v as u64)).unwrap_or(PackedValue::Nil),
        (ColumnKind::Real, _) => value.as_f64().map(PackedValue::F64).unwrap_or(PackedValue::Nil),
        (ColumnKind::Blob | ColumnKind::Spatial, driver::Value::Bytes(b)) => PackedValue::Bytes(b.clone()),
        (_, driver::Value::Text(s) | driver::Value::Decimal(s)) => PackedValue::Bytes(s.clone().into_bytes()),
        (_, driver::Value::Bytes(b)) => PackedValue::Bytes(b.clone()),
        (_, driver::Value::Bool(b)) => PackedValue::Bool(*b),
        (_, driver::Value::Json(j)) => PackedValue::Bytes(j.to_string().into_bytes()),
        (_, driver::Value::Uuid(bytes)) => PackedValue::Bytes(bytes.to_vec()),
        _ => value.as_i64().map(PackedValue::Int).unwrap_or(PackedValue::Nil),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_cell_packs_to_nil_regardless_of_kind() {
        assert_eq!(pack_cell(ColumnKind::SignedInt, &driver::Value::Null), PackedValue::Nil);
    }

    #[test]
    fn bool_cell_packs_to_bool() {
        assert_eq!(pack_cell(ColumnKind::Bool, &driver::Value::Bool(true)), PackedValue::Bool(true));
    }

    #[test]
    fn text_cell_packs_to_raw_bytes() {
        let packed = pack_cell(ColumnKind::Text, &driver::Value::Text("hi".into()));
        assert_eq!(packed, PackedValue::Bytes(b"hi".to_vec()));
    }
}
