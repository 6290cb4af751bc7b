//! PostgreSQL backend adapter for Kitchen Sync (spec component C5).
//!
//! This crate implements the PostgreSQL wire protocol from scratch using
//! asupersync's TCP primitives, then wraps the live connection in
//! [`adapter::PostgresAdapter`], the engine-specific implementation of
//! [`kitchensync_adapter::Adapter`] that the endpoint driver (C8) runs
//! against.
//!
//! - Message framing and parsing: [`protocol`]
//! - Authentication (cleartext, MD5, SCRAM-SHA-256): [`auth`]
//! - Simple and extended query protocols, connection state machine: [`async_connection`]
//! - Type conversion between Rust and PostgreSQL wire types: [`types`]
//! - Schema introspection, escaping, snapshotting: [`adapter`]
//!
//! # Example
//!
//! ```rust,ignore
//! use kitchensync_postgres::{PgConfig, adapter::PostgresAdapter};
//!
//! let config = PgConfig::new()
//!     .host("localhost")
//!     .port(5432)
//!     .user("postgres")
//!     .database("mydb");
//!
//! let adapter = PostgresAdapter::connect(&cx, config).await?;
//! ```

pub mod adapter;
pub mod async_connection;
pub mod auth;
pub mod config;
pub mod escape;
pub mod introspect;
pub mod protocol;
pub mod rowpack;
pub mod tls;
pub mod typemap;
pub mod types;

pub use adapter::PostgresAdapter;
pub use async_connection::{ConnectionState, PgAsyncConnection, SharedPgConnection, TransactionStatusState};
pub use config::{PgConfig, SslMode};
pub use types::{Format, TypeCategory, TypeInfo, TypeRegistry};
