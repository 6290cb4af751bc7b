//! Error types for Kitchen Sync endpoint sessions.

use std::fmt;

/// The primary error type for a Kitchen Sync endpoint session.
#[derive(Debug)]
pub enum Error {
    /// A peer requested or replied with a protocol version outside
    /// `[EARLIEST_SUPPORTED_VERSION, LATEST_SUPPORTED_VERSION]`.
    ProtocolVersion(ProtocolVersionError),
    /// Wire codec decode failure.
    Codec(CodecError),
    /// `to`-side schema comparison found a structural disagreement. The
    /// message is part of the public contract: user-visible wording, not
    /// to be altered or wrapped.
    SchemaMismatch(String),
    /// The underlying database engine reported an error.
    Database(DatabaseError),
    /// The peer stream closed unexpectedly (EOF while awaiting a reply, or
    /// a write failed).
    ConnectionLost,
    /// A command isn't known in the negotiated protocol version.
    Unsupported(UnsupportedError),
}

#[derive(Debug)]
pub struct ProtocolVersionError {
    pub peer_version: i64,
}

#[derive(Debug)]
pub enum CodecError {
    /// The stream ended before a complete value could be decoded.
    ShortRead,
    /// The decoded tag is incompatible with the type the caller requested.
    TypeMismatch { expected: &'static str, found: &'static str },
    /// A declared length prefix was negative or implausibly large.
    MalformedLength { declared: i64 },
}

#[derive(Debug)]
pub struct DatabaseError {
    pub message: String,
    /// First 200 characters of the offending SQL statement, if known.
    pub sql: Option<String>,
}

#[derive(Debug)]
pub struct UnsupportedError {
    pub command: String,
    pub version: i64,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ProtocolVersion(e) => {
                write!(f, "unsupported protocol version {}", e.peer_version)
            }
            Error::Codec(e) => match e {
                CodecError::ShortRead => write!(f, "codec error: short read"),
                CodecError::TypeMismatch { expected, found } => {
                    write!(f, "codec error: expected {expected}, found {found}")
                }
                CodecError::MalformedLength { declared } => {
                    write!(f, "codec error: malformed length {declared}")
                }
            },
            Error::SchemaMismatch(reason) => write!(f, "{reason}"),
            Error::Database(e) => {
                if let Some(sql) = &e.sql {
                    write!(f, "database error: {} (SQL: {})", e.message, sql)
                } else {
                    write!(f, "database error: {}", e.message)
                }
            }
            Error::ConnectionLost => write!(f, "connection lost"),
            Error::Unsupported(e) => write!(
                f,
                "command {:?} not supported in protocol version {}",
                e.command, e.version
            ),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database(DatabaseError { message: message.into(), sql: None })
    }

    pub fn database_with_sql(message: impl Into<String>, sql: &str) -> Self {
        let truncated: String = sql.chars().take(200).collect();
        Error::Database(DatabaseError { message: message.into(), sql: Some(truncated) })
    }

    pub fn unsupported(command: impl Into<String>, version: i64) -> Self {
        Error::Unsupported(UnsupportedError { command: command.into(), version })
    }

    pub fn schema_mismatch(reason: impl Into<String>) -> Self {
        Error::SchemaMismatch(reason.into())
    }
}

/// Result type alias used throughout Kitchen Sync.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_display_is_the_bare_message() {
        let err = Error::schema_mismatch("Missing table b");
        assert_eq!(err.to_string(), "Missing table b");
    }

    #[test]
    fn database_error_truncates_sql_to_200_chars() {
        let sql = "x".repeat(500);
        let err = Error::database_with_sql("syntax error", &sql);
        match err {
            Error::Database(e) => assert_eq!(e.sql.unwrap().len(), 200),
            _ => panic!("wrong variant"),
        }
    }
}
