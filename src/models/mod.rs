//! Data models shared across portico.
//!
//! This module re-exports the connection settings and query value types.

pub mod connection;
pub mod query;

pub use connection::{ConnectionConfigError, ConnectionSettings, DatabaseType};
pub use query::{DEFAULT_QUERY_TIMEOUT_SECS, QueryParam, QueryRecord};
