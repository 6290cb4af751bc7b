//! Wire-level foundations shared by every Kitchen Sync crate:
//!
//! - [`codec`] — the packed-value codec (spec component C1)
//! - [`framed`] — the framed command stream built on it (C2)
//! - [`protocol`] — version constants and the command-name vocabulary
//! - [`error`] — the session-wide `Error`/`Result` types
//! - [`value`] — `PackedValue`, the codec's decoded-but-uninterpreted
//!   value universe
//!
//! `Cx`/`Outcome` are re-exported from `asupersync`, the async runtime
//! every adapter's I/O-bound trait method is expressed against.

pub use asupersync::{Cx, Outcome};

pub mod codec;
pub mod error;
pub mod framed;
pub mod protocol;
pub mod value;

pub use error::{CodecError, DatabaseError, Error, ProtocolVersionError, Result, UnsupportedError};
pub use framed::FramedStream;
pub use value::PackedValue;
