//! Per-alias connection wrapper.
//!
//! A `DatabaseWrapper` opens its pool lazily on first use and decides on its own
//! when the pool has become stale. The request lifecycle hooks in
//! [`lifecycle`](crate::db::lifecycle) only ask it to check; the decision lives here.
//!
//! # Lifetime rules
//!
//! - `conn_max_age = Some(0)`: the connection is obsolete as soon as it is opened,
//!   so it is closed at the next lifecycle check (end of the request).
//! - `conn_max_age = Some(n)`: obsolete `n` seconds after it was opened.
//! - `conn_max_age = None`: never obsolete.
//!
//! Independently of age, a connection that saw an error is probed at the next
//! check and closed if the probe fails.
//!
//! Concurrent requests share the wrapper's pool, so checks are deferred while
//! any request is in flight; the last request to finish runs the check.

use crate::db::executor;
use crate::db::pool::DbPool;
use crate::db::query_log::QueryLog;
use crate::db::types::JsonRow;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSettings, DEFAULT_QUERY_TIMEOUT_SECS, QueryParam, QueryRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ConnectionState {
    pool: Option<DbPool>,
    /// Deadline after which the connection counts as obsolete.
    close_at: Option<Instant>,
    errors_occurred: bool,
    health_check_done: bool,
    /// Requests between `begin_request` and `end_request`.
    active_requests: usize,
}

#[derive(Debug)]
pub struct DatabaseWrapper {
    settings: ConnectionSettings,
    state: Mutex<ConnectionState>,
    queries_log: QueryLog,
    force_debug_cursor: AtomicBool,
    query_timeout: Duration,
}

impl DatabaseWrapper {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(ConnectionState::default()),
            queries_log: QueryLog::new(),
            force_debug_cursor: AtomicBool::new(false),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn alias(&self) -> &str {
        &self.settings.alias
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn queries_log(&self) -> &QueryLog {
        &self.queries_log
    }

    /// Log queries even when `debug` is off for this alias.
    pub fn set_force_debug_cursor(&self, enabled: bool) {
        self.force_debug_cursor.store(enabled, Ordering::Release);
    }

    pub fn queries_logged(&self) -> bool {
        self.settings.debug || self.force_debug_cursor.load(Ordering::Acquire)
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.pool.is_some()
    }

    /// Number of requests currently using this connection.
    pub async fn active_requests(&self) -> usize {
        self.state.lock().await.active_requests
    }

    /// Register a request that may use the pool. Lifecycle checks are skipped
    /// until the matching [`end_request`](Self::end_request).
    pub async fn begin_request(&self) {
        self.state.lock().await.active_requests += 1;
    }

    pub async fn end_request(&self) {
        let mut state = self.state.lock().await;
        state.active_requests = state.active_requests.saturating_sub(1);
    }

    /// Flag the connection so the next lifecycle check probes it.
    pub async fn mark_error(&self) {
        self.state.lock().await.errors_occurred = true;
    }

    /// Return the open pool, connecting first if needed.
    ///
    /// With `conn_health_checks` enabled, a reused pool is probed once per
    /// request cycle and replaced if the probe fails.
    pub async fn ensure_connection(&self) -> DbResult<DbPool> {
        let mut state = self.state.lock().await;
        let mut stale = None;

        if state.pool.as_ref().is_some_and(DbPool::is_closed) {
            debug!(alias = %self.settings.alias, "Pool was closed elsewhere, reconnecting");
            stale = Self::take_pool(&mut state);
        }

        if self.settings.conn_health_checks && !state.health_check_done {
            if let Some(pool) = state.pool.clone() {
                if pool.probe().await.is_err() {
                    warn!(alias = %self.settings.alias, "Health check failed, reconnecting");
                    stale = Self::take_pool(&mut state);
                }
                state.health_check_done = true;
            }
        }

        if let Some(pool) = &state.pool {
            return Ok(pool.clone());
        }

        info!(
            alias = %self.settings.alias,
            db_type = %self.settings.db_type,
            url = %self.settings.masked_connection_string(),
            "Connecting to database"
        );
        let connected = DbPool::connect(&self.settings).await;
        if let Ok(pool) = &connected {
            state.close_at = self.settings.max_age().map(|age| Instant::now() + age);
            state.errors_occurred = false;
            state.health_check_done = true;
            state.pool = Some(pool.clone());
        }
        drop(state);

        if let Some(pool) = stale {
            self.close_pool(pool).await;
        }
        connected
    }

    /// Close the connection if one is open.
    pub async fn close(&self) {
        let pool = Self::take_pool(&mut *self.state.lock().await);
        if let Some(pool) = pool {
            self.close_pool(pool).await;
        }
    }

    /// Probe the open connection. A closed wrapper is not usable.
    pub async fn is_usable(&self) -> bool {
        let pool = self.state.lock().await.pool.clone();
        match pool {
            Some(pool) => pool.probe().await.is_ok(),
            None => false,
        }
    }

    /// Close the connection when it errored and no longer answers, or when it
    /// has outlived `conn_max_age`. Returns whether a connection was closed.
    ///
    /// Does nothing while a request is in flight on this connection.
    pub async fn close_if_unusable_or_obsolete(&self) -> bool {
        let stale = {
            let mut state = self.state.lock().await;
            self.take_if_unusable_or_obsolete(&mut state).await
        };
        match stale {
            Some(pool) => {
                self.close_pool(pool).await;
                true
            }
            None => false,
        }
    }

    async fn take_if_unusable_or_obsolete(&self, state: &mut ConnectionState) -> Option<DbPool> {
        let pool = state.pool.clone()?;
        if state.active_requests > 0 {
            return None;
        }

        state.health_check_done = false;

        if state.errors_occurred {
            if pool.probe().await.is_ok() {
                state.errors_occurred = false;
                state.health_check_done = true;
            } else {
                debug!(alias = %self.settings.alias, "Closing unusable connection");
                return Self::take_pool(state);
            }
        }

        match state.close_at {
            Some(close_at) if Instant::now() >= close_at => {
                debug!(alias = %self.settings.alias, "Closing connection past its max age");
                Self::take_pool(state)
            }
            _ => None,
        }
    }

    /// Run a query and decode the rows. `row_limit` caps how many rows are read.
    pub async fn fetch_json(
        &self,
        sql: &str,
        params: &[QueryParam],
        row_limit: Option<usize>,
    ) -> DbResult<Vec<JsonRow>> {
        let pool = self.ensure_connection().await?;
        let start = Instant::now();
        debug!(alias = %self.settings.alias, sql = %sql, params = params.len(), "Executing query");

        let result =
            executor::fetch_json(&pool, sql, params, row_limit, self.query_timeout).await;
        self.after_query(sql, params.len(), start, result.as_ref().err())
            .await;
        result
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let pool = self.ensure_connection().await?;
        let start = Instant::now();
        debug!(alias = %self.settings.alias, sql = %sql, params = params.len(), "Executing statement");

        let result = executor::execute(&pool, sql, params, self.query_timeout).await;
        self.after_query(sql, params.len(), start, result.as_ref().err())
            .await;
        result
    }

    async fn after_query(&self, sql: &str, params: usize, start: Instant, error: Option<&DbError>) {
        if self.queries_logged() {
            let duration_ms = start.elapsed().as_millis() as u64;
            self.queries_log
                .record(QueryRecord::new(sql, params, duration_ms));
        }
        if let Some(err) = error {
            if marks_connection(err) {
                self.mark_error().await;
            }
        }
    }

    fn take_pool(state: &mut ConnectionState) -> Option<DbPool> {
        state.close_at = None;
        state.pool.take()
    }

    /// Waits for checked-out connections, so callers must not hold the state lock.
    async fn close_pool(&self, pool: DbPool) {
        pool.close().await;
        info!(alias = %self.settings.alias, "Connection closed");
    }
}

/// Data and integrity errors (SQLSTATE classes 22 and 23) say nothing about
/// the health of the connection; everything else does.
fn marks_connection(err: &DbError) -> bool {
    match err {
        DbError::Database {
            sql_state: Some(code),
            ..
        } => !(code.starts_with("22") || code.starts_with("23")),
        DbError::InvalidInput { .. } => false,
        _ => true,
    }
}
