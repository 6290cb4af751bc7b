//! Types shared by every engine's live-connection wire code
//! (`kitchensync-postgres`, `kitchensync-mysql`): a dynamically-typed
//! native [`Value`], the [`Row`]/[`ColumnInfo`] pair a query result is
//! decoded into, the driver-level [`Error`] hierarchy those wire
//! protocols raise, and the transaction vocabulary
//! ([`IsolationLevel`], [`PreparedStatement`]) their connection types
//! use.
//!
//! This is deliberately a different vocabulary from
//! [`kitchensync_core::PackedValue`]: `Value` is what a driver decodes
//! a wire cell into using the engine's *native* type system (OID, MySQL
//! column type byte, …); `PackedValue` is what crosses the Kitchen Sync
//! wire to the peer once an adapter's row-pack step (spec.md §4.4) has
//! mapped a `Value` through the column's `ColumnKind`. Keeping them
//! separate means a decode bug in one never corrupts the other.

use std::fmt;
use std::sync::Arc;

use kitchensync_core::error::{CodecError, Error as CoreError};

/// A dynamically-typed value as decoded off an engine's wire protocol,
/// before a [`crate::Adapter`] row-pack step narrows it to a
/// `PackedValue` cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Arbitrary-precision decimal, kept as its canonical text form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since midnight.
    Time(i64),
    /// Microseconds since the Unix epoch, no timezone.
    Timestamp(i64),
    /// Microseconds since the Unix epoch, UTC.
    TimestampTz(i64),
    Uuid([u8; 16]),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::TimestampTz(_) => "TIMESTAMPTZ",
            Value::Uuid(_) => "UUID",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

/// Column metadata shared by every row of one result set. Wrapped in an
/// `Arc` so decoding N rows of a result allocates the name table once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
}

impl ColumnInfo {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// One row of a query result: column metadata shared with its
/// siblings, values owned by this row alone.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Convenience constructor for a row that owns its column names
    /// outright rather than sharing an `Arc<ColumnInfo>` with sibling
    /// rows. Engine wire decoders that parse one row at a time (no
    /// batched result set to amortize the name table over) use this.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(column_names)), values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &ColumnInfo {
        &self.columns
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// One statement prepared on the live connection, tracked by the
/// engine-assigned id the wire protocol uses to address it again.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub id: u64,
    pub sql: String,
    pub param_count: usize,
    /// Result-column names, empty for statements with no result set.
    pub columns: Vec<String>,
}

impl PreparedStatement {
    pub fn new(id: u64, sql: String, param_count: usize) -> Self {
        Self { id, sql, param_count, columns: Vec::new() }
    }

    pub fn with_columns(id: u64, sql: String, param_count: usize, columns: Vec<String>) -> Self {
        Self { id, sql, param_count, columns }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub const fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Driver-level error hierarchy raised while a live wire connection is
/// being established or driven. Distinct from [`kitchensync_core::Error`]
/// (the session-wide error the endpoint driver propagates): a driver
/// error is richer while it is still close to the wire, and is folded
/// into a single [`kitchensync_core::Error::Database`] (or
/// `ConnectionLost`) the moment it crosses the [`crate::Adapter`]
/// boundary, via [`Error::into_core_error`].
#[derive(Debug)]
pub enum Error {
    Connection(ConnectionError),
    Query(QueryError),
    Type(TypeError),
    Protocol(ProtocolError),
    /// The wire operation did not complete within the caller's deadline.
    Timeout,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    Connect,
    Refused,
    Disconnected,
    Authentication,
    Ssl,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub sqlstate: Option<String>,
    pub sql: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<usize>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Syntax,
    Constraint,
    Deadlock,
    Serialization,
    Timeout,
    Cancelled,
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection error: {}", e.message),
            Error::Query(e) => write!(f, "query error: {}", e.message),
            Error::Type(e) => write!(f, "type error: expected {}, found {}", e.expected, e.actual),
            Error::Protocol(e) => write!(f, "protocol error: {}", e.message),
            Error::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Fold a driver-level error into the session-wide error type an
    /// [`crate::Adapter`] method returns, truncating any attached SQL to
    /// 200 characters per spec.md §7.
    pub fn into_core_error(self) -> CoreError {
        match self {
            Error::Connection(e) if e.kind == ConnectionErrorKind::Disconnected => CoreError::ConnectionLost,
            Error::Connection(e) => CoreError::database(e.message),
            Error::Query(e) => match e.sql {
                Some(sql) => CoreError::database_with_sql(e.message, &sql),
                None => CoreError::database(e.message),
            },
            Error::Type(e) => CoreError::database(format!("type error: expected {}, found {}", e.expected, e.actual)),
            Error::Protocol(e) => {
                CoreError::Codec(CodecError::TypeMismatch { expected: "well-formed wire message", found: "malformed" })
                    .also_log(&e.message)
            }
            Error::Timeout => CoreError::ConnectionLost,
        }
    }
}

/// Hack-free way to attach a log line to an error variant built above
/// without changing `CoreError`'s shape: the protocol-error path logs
/// the detail and returns the plain codec error, since
/// `kitchensync_core::Error` carries no free-form message slot for it.
trait AlsoLog {
    fn also_log(self, message: &str) -> Self;
}

impl AlsoLog for CoreError {
    fn also_log(self, message: &str) -> Self {
        tracing::warn!(message, "driver protocol error folded into a codec error at the adapter boundary");
        self
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn connection_error(kind: ConnectionErrorKind, message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError { kind, message: message.into(), source: None })
}

pub fn query_error(kind: QueryErrorKind, message: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind,
        message: message.into(),
        sqlstate: None,
        sql: None,
        detail: None,
        hint: None,
        position: None,
        source: None,
    })
}

pub fn protocol_error(message: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError { message: message.into(), raw_data: None, source: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_connection_error_becomes_connection_lost() {
        let err = connection_error(ConnectionErrorKind::Disconnected, "EOF").into_core_error();
        assert!(matches!(err, CoreError::ConnectionLost));
    }

    #[test]
    fn query_error_with_sql_preserves_message_and_truncates_sql() {
        let sql = "x".repeat(500);
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            message: "syntax error".into(),
            sqlstate: Some("42601".into()),
            sql: Some(sql),
            detail: None,
            hint: None,
            position: None,
            source: None,
        })
        .into_core_error();
        match err {
            CoreError::Database(e) => {
                assert_eq!(e.message, "syntax error");
                assert_eq!(e.sql.unwrap().len(), 200);
            }
            _ => panic!("expected Database variant"),
        }
    }

    #[test]
    fn row_get_by_name_finds_the_matching_column() {
        let columns = Arc::new(ColumnInfo::new(vec!["id".into(), "name".into()]));
        let row = Row::with_columns(columns, vec![Value::Int(1), Value::Text("widget".into())]);
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("widget".into())));
        assert_eq!(row.get_by_name("missing"), None);
    }
}
