//! Portico
//!
//! Per-request database connection lifecycle and view shortcuts for axum
//! services backed by sqlx (SQLite, PostgreSQL, MySQL).

pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod http;
pub mod models;
pub mod orm;
pub mod shortcuts;
pub mod signals;
pub mod template;
pub mod urls;

pub use config::Config;
pub use error::{DbError, ShortcutError, ShortcutResult};
pub use signals::RequestSignals;
