//! Error types for portico.
//!
//! `DbError` covers connection and query failures raised by the database layer.
//! `ShortcutError` is what view helpers return; it converts into an HTTP response
//! so handlers can propagate it with `?`.

use crate::orm::OrmError;
use crate::template::TemplateError;
use crate::urls::NoReverseMatch;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Connection not found: {alias}")]
    ConnectionNotFound { alias: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn connection_not_found(alias: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            alias: alias.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Connection-level failures mark the wrapper as needing a usability check.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::database(
                format!("Column not found: {}", col),
                None,
                "Check the model's column names against the table",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors returned by the view shortcuts.
#[derive(Error, Debug)]
pub enum ShortcutError {
    /// The requested object or list does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    NoReverseMatch(#[from] NoReverseMatch),

    #[error("get() returned more than one {model} -- it returned {count}!")]
    MultipleObjectsReturned { model: &'static str, count: String },

    #[error("Unsafe redirect to URL with protocol '{scheme}'")]
    DisallowedRedirect { scheme: String },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl ShortcutError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// HTTP status this error renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DisallowedRedirect { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrmError> for ShortcutError {
    fn from(err: OrmError) -> Self {
        match err {
            OrmError::DoesNotExist { model } => {
                Self::not_found(format!("No {} matches the given query.", model))
            }
            OrmError::MultipleObjectsReturned { model, count } => {
                Self::MultipleObjectsReturned { model, count }
            }
            OrmError::InvalidInput { message } => Self::InvalidInput { message },
            OrmError::Database(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for ShortcutError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Internals stay in the log, not in the body.
            tracing::error!(status = status.as_u16(), error = %self, "view failed");
            let reason = status.canonical_reason().unwrap_or("Internal Server Error");
            return (status, reason.to_string()).into_response();
        }
        (status, self.to_string()).into_response()
    }
}

/// Result type alias for view shortcuts.
pub type ShortcutResult<T> = Result<T, ShortcutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::internal("boom").suggestion(), None);
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(DbError::timeout("query", 30).is_connection_error());
        assert!(DbError::connection("err", "sugg").is_connection_error());
        assert!(!DbError::invalid_input("bad").is_connection_error());
    }

    #[test]
    fn test_does_not_exist_becomes_not_found() {
        let err: ShortcutError = OrmError::does_not_exist("Article").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "No Article matches the given query.");
    }

    #[test]
    fn test_multiple_objects_passes_through() {
        let err: ShortcutError = OrmError::multiple_objects("Article", 3).into();
        assert!(matches!(err, ShortcutError::MultipleObjectsReturned { .. }));
        assert_eq!(
            err.to_string(),
            "get() returned more than one Article -- it returned 3!"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ShortcutError::DisallowedRedirect {
                scheme: "javascript".into()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ShortcutError::from(DbError::internal("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_error_body_hides_details() {
        let response = ShortcutError::from(DbError::internal("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
