//! MySQL backend adapter for Kitchen Sync (spec component C6).
//!
//! This crate implements the MySQL wire protocol from scratch using
//! asupersync's TCP primitives, then wraps the live connection in
//! [`adapter::MySqlAdapter`], the engine-specific implementation of
//! [`kitchensync_adapter::Adapter`] that the endpoint driver (C8) runs
//! against.
//!
//! - Packet framing with sequence numbers, text and binary protocols: [`protocol`]
//! - Authentication (`mysql_native_password`, `caching_sha2_password`): [`auth`]
//! - Connection state machine, extended query support: [`async_connection`]
//! - Type conversion between Rust and MySQL wire types: [`types`]
//! - Schema introspection, escaping, consistent-snapshot transactions: [`adapter`]
//!
//! # Example
//!
//! ```rust,ignore
//! use kitchensync_mysql::{MySqlConfig, adapter::MySqlAdapter};
//!
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("mydb");
//!
//! let adapter = MySqlAdapter::connect(&cx, config).await?;
//! ```

pub mod adapter;
pub mod async_connection;
pub mod auth;
pub mod config;
pub mod connection;
pub mod escape;
pub mod introspect;
pub mod protocol;
pub mod rowpack;
pub mod tls;
pub mod typemap;
pub mod types;

pub use adapter::MySqlAdapter;
pub use async_connection::{MySqlAsyncConnection, SharedMySqlConnection};
pub use config::{MySqlConfig, SslMode};
pub use connection::ConnectionState;
