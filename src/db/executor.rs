//! Query execution.
//!
//! Runs parameterized statements against a [`DbPool`] with a timeout and decodes
//! result rows into JSON maps. Each backend has its own submodule with the same
//! interface; the code structure is kept parallel to make differences obvious.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::db::types::{JsonRow, RowToJson};
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

/// Fetch at most `row_limit` rows (all rows when `None`).
pub async fn fetch_json(
    pool: &DbPool,
    sql: &str,
    params: &[QueryParam],
    row_limit: Option<usize>,
    query_timeout: Duration,
) -> DbResult<Vec<JsonRow>> {
    match pool {
        DbPool::MySql(p) => {
            let rows = mysql::fetch_rows(p, sql, params, row_limit, query_timeout).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        }
        DbPool::Postgres(p) => {
            let rows = postgres::fetch_rows(p, sql, params, row_limit, query_timeout).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        }
        DbPool::SQLite(p) => {
            let rows = sqlite::fetch_rows(p, sql, params, row_limit, query_timeout).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        }
    }
}

/// Execute a statement and return the number of affected rows.
pub async fn execute(
    pool: &DbPool,
    sql: &str,
    params: &[QueryParam],
    query_timeout: Duration,
) -> DbResult<u64> {
    match pool {
        DbPool::MySql(p) => mysql::execute(p, sql, params, query_timeout).await,
        DbPool::Postgres(p) => postgres::execute(p, sql, params, query_timeout).await,
        DbPool::SQLite(p) => sqlite::execute(p, sql, params, query_timeout).await,
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs() as u32)
}

mod mysql {
    use super::*;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        row_limit: Option<usize>,
        query_timeout: Duration,
    ) -> DbResult<Vec<MySqlRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let stream = query.fetch(pool);
        let rows_future = stream.take(row_limit.unwrap_or(usize::MAX)).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        match timeout(query_timeout, query.execute(pool)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        row_limit: Option<usize>,
        query_timeout: Duration,
    ) -> DbResult<Vec<PgRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let stream = query.fetch(pool);
        let rows_future = stream.take(row_limit.unwrap_or(usize::MAX)).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        match timeout(query_timeout, query.execute(pool)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        row_limit: Option<usize>,
        query_timeout: Duration,
    ) -> DbResult<Vec<SqliteRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let stream = query.fetch(pool);
        let rows_future = stream.take(row_limit.unwrap_or(usize::MAX)).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        match timeout(query_timeout, query.execute(pool)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}
