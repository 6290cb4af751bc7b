//! PostgreSQL authentication mechanisms.
//!
//! Cleartext and MD5 password auth are simple enough to live inline in
//! [`crate::async_connection`]; SCRAM-SHA-256 is involved enough (three
//! message round-trips, HMAC/PBKDF2 key derivation) to warrant its own
//! module.

pub mod scram;

pub use scram::ScramClient;
