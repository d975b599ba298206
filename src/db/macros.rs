//! Database dispatch macros for reducing code duplication.
//!
//! Every backend-specific operation on a [`DbPool`](crate::db::DbPool) is a
//! three-armed match with identical bodies; this macro writes the match.

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, p => p.close().await)
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            $crate::db::pool::DbPool::MySql($p) => $body,
            $crate::db::pool::DbPool::Postgres($p) => $body,
            $crate::db::pool::DbPool::SQLite($p) => $body,
        }
    };
}

pub use impl_db_dispatch;
