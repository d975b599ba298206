//! Integration tests for per-request connection lifecycle.
//!
//! These tests drive an axum router wrapped in the lifecycle middleware and
//! check connection state and query logs between requests.

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use portico::db::{ConnectionHandler, DatabaseWrapper, connect_request_signals};
use portico::error::ShortcutResult;
use portico::http::with_request_lifecycle;
use portico::models::ConnectionSettings;
use portico::signals::RequestSignals;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;

fn settings(alias: &str, file: &NamedTempFile) -> ConnectionSettings {
    ConnectionSettings::new(alias, format!("sqlite:{}", file.path().display())).unwrap()
}

/// Runs one query on the default connection.
async fn touch_db(State(db): State<Arc<ConnectionHandler>>) -> ShortcutResult<String> {
    let conn = db.default_connection().await?;
    let rows = conn.fetch_json("SELECT 1 AS one", &[], None).await?;
    Ok(rows.len().to_string())
}

/// Runs two queries with a pause between them, so requests overlap.
async fn slow_touch(State(db): State<Arc<ConnectionHandler>>) -> ShortcutResult<String> {
    let conn = db.default_connection().await?;
    conn.fetch_json("SELECT 1 AS one", &[], None).await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let rows = conn.fetch_json("SELECT 2 AS two", &[], None).await?;
    Ok(rows.len().to_string())
}

fn app(db: &Arc<ConnectionHandler>) -> Router {
    let signals = Arc::new(RequestSignals::new());
    connect_request_signals(&signals, Arc::clone(db));
    let router = Router::new()
        .route("/touch", get(touch_db))
        .route("/slow", get(slow_touch))
        .route("/idle", get(|| async { "idle" }))
        .with_state(Arc::clone(db));
    with_request_lifecycle(router, signals)
}

async fn get_status(router: &Router, uri: &str) -> StatusCode {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_request_scoped_connection_closes_after_request() {
    let file = NamedTempFile::new().unwrap();
    let db = Arc::new(ConnectionHandler::new());
    let conn = db
        .register(settings("default", &file).with_conn_max_age(Some(0)))
        .await
        .unwrap();
    let router = app(&db);

    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert!(!conn.is_connected().await);

    // The next request opens a fresh connection
    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert!(!conn.is_connected().await);
}

#[tokio::test]
async fn test_persistent_connection_survives_requests() {
    let file = NamedTempFile::new().unwrap();
    let db = Arc::new(ConnectionHandler::new());
    let conn = db
        .register(settings("default", &file).with_conn_max_age(None))
        .await
        .unwrap();
    let router = app(&db);

    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert!(conn.is_connected().await);
    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert!(conn.is_connected().await);
}

#[tokio::test]
async fn test_max_age_in_future_keeps_connection() {
    let file = NamedTempFile::new().unwrap();
    let db = Arc::new(ConnectionHandler::new());
    let conn = db
        .register(settings("default", &file).with_conn_max_age(Some(3600)))
        .await
        .unwrap();
    let router = app(&db);

    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert!(conn.is_connected().await);
}

#[tokio::test]
async fn test_request_started_resets_every_query_log() {
    let default_file = NamedTempFile::new().unwrap();
    let other_file = NamedTempFile::new().unwrap();
    let db = Arc::new(ConnectionHandler::new());
    let default = db
        .register(
            settings("default", &default_file)
                .with_conn_max_age(None)
                .with_debug(true),
        )
        .await
        .unwrap();
    let other = db
        .insert(DatabaseWrapper::new(
            settings("other", &other_file).with_debug(true),
        ))
        .await
        .unwrap();
    let router = app(&db);

    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert_eq!(default.queries_log().len(), 1);

    other.fetch_json("SELECT 2", &[], None).await.unwrap();
    assert_eq!(other.queries_log().len(), 1);

    // A request that runs no queries still clears the logs on start
    assert_eq!(get_status(&router, "/idle").await, StatusCode::OK);
    assert!(default.queries_log().is_empty());
    assert!(other.queries_log().is_empty());
}

#[tokio::test]
async fn test_errored_but_healthy_connection_is_kept() {
    let file = NamedTempFile::new().unwrap();
    let db = Arc::new(ConnectionHandler::new());
    let conn = db
        .register(settings("default", &file).with_conn_max_age(None))
        .await
        .unwrap();
    let router = app(&db);

    assert_eq!(get_status(&router, "/touch").await, StatusCode::OK);
    assert!(conn.is_connected().await);

    // An error on a healthy connection does not close it
    assert!(conn.fetch_json("SELECT * FROM no_such_table", &[], None).await.is_err());
    assert_eq!(get_status(&router, "/idle").await, StatusCode::OK);
    assert!(conn.is_connected().await);
}

#[tokio::test]
async fn test_missing_default_connection_is_server_error() {
    let db = Arc::new(ConnectionHandler::new());
    let router = app(&db);
    assert_eq!(
        get_status(&router, "/touch").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_request_scoped_connection() {
    let file = NamedTempFile::new().unwrap();
    let db = Arc::new(ConnectionHandler::new());
    let conn = db
        .register(settings("default", &file).with_conn_max_age(Some(0)))
        .await
        .unwrap();
    let router = app(&db);

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let router = router.clone();
            tokio::spawn(async move { get_status(&router, "/slow").await })
        })
        .collect();

    let mut failed = 0;
    for task in tasks {
        if task.await.unwrap() != StatusCode::OK {
            failed += 1;
        }
    }
    assert_eq!(failed, 0);

    // The last request to finish closes the connection
    assert_eq!(conn.active_requests().await, 0);
    assert!(!conn.is_connected().await);
}
