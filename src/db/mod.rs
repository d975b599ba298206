//! Database connection handling.
//!
//! This module provides:
//! - Lazy per-alias connections with lifetime and health tracking
//! - The alias registry shared across requests
//! - Request lifecycle hooks that reset query logs and close stale connections
//! - Query execution and row decoding

pub mod executor;
pub mod handler;
pub mod lifecycle;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod query_log;
pub mod types;
pub mod wrapper;

pub use handler::{ConnectionHandler, DEFAULT_DB_ALIAS};
pub use lifecycle::{
    begin_request, close_old_connections, connect_request_signals, end_request, reset_queries,
};
pub use pool::DbPool;
pub use query_log::{QUERIES_LOG_LIMIT, QueryLog};
pub use types::JsonRow;
pub use wrapper::DatabaseWrapper;
