//! Connection registry.
//!
//! `ConnectionHandler` maps connection aliases to their [`DatabaseWrapper`]s.
//! It is created once at startup and shared as `Arc<ConnectionHandler>`.

use crate::db::wrapper::DatabaseWrapper;
use crate::error::{DbError, DbResult};
use crate::models::ConnectionSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Alias used when no connection is named explicitly.
pub const DEFAULT_DB_ALIAS: &str = "default";

#[derive(Debug, Default)]
pub struct ConnectionHandler {
    connections: RwLock<HashMap<String, Arc<DatabaseWrapper>>>,
}

impl ConnectionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Nothing is opened until first use.
    pub async fn register(&self, settings: ConnectionSettings) -> DbResult<Arc<DatabaseWrapper>> {
        self.insert(DatabaseWrapper::new(settings)).await
    }

    /// Register an already-built wrapper.
    pub async fn insert(&self, wrapper: DatabaseWrapper) -> DbResult<Arc<DatabaseWrapper>> {
        let alias = wrapper.alias().to_string();
        let mut connections = self.connections.write().await;
        if connections.contains_key(&alias) {
            return Err(DbError::connection(
                format!("Connection '{}' already exists", alias),
                "Use a different alias for each configured database",
            ));
        }

        info!(
            alias = %alias,
            db_type = %wrapper.settings().db_type,
            conn_max_age = ?wrapper.settings().conn_max_age,
            "Registered database connection"
        );
        let wrapper = Arc::new(wrapper);
        connections.insert(alias, Arc::clone(&wrapper));
        Ok(wrapper)
    }

    pub async fn get(&self, alias: &str) -> DbResult<Arc<DatabaseWrapper>> {
        let connections = self.connections.read().await;
        connections
            .get(alias)
            .cloned()
            .ok_or_else(|| DbError::connection_not_found(alias))
    }

    /// The connection registered under [`DEFAULT_DB_ALIAS`].
    pub async fn default_connection(&self) -> DbResult<Arc<DatabaseWrapper>> {
        self.get(DEFAULT_DB_ALIAS).await
    }

    /// Every registered connection, in no particular order.
    pub async fn all(&self) -> Vec<Arc<DatabaseWrapper>> {
        let connections = self.connections.read().await;
        connections.values().cloned().collect()
    }

    pub async fn aliases(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        connections.keys().cloned().collect()
    }

    pub async fn exists(&self, alias: &str) -> bool {
        self.connections.read().await.contains_key(alias)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close every open connection. Registrations are kept.
    pub async fn close_all(&self) {
        // Snapshot under the lock, close outside it
        for wrapper in self.all().await {
            wrapper.close().await;
        }
        info!("All connections closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(alias: &str) -> ConnectionSettings {
        ConnectionSettings::new(alias, "sqlite:unused.db").unwrap()
    }

    #[tokio::test]
    async fn test_handler_creation() {
        let handler = ConnectionHandler::new();
        assert_eq!(handler.connection_count().await, 0);
        assert!(handler.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_connection_not_found() {
        let handler = ConnectionHandler::new();
        let result = handler.get("nonexistent").await;
        assert!(matches!(result, Err(DbError::ConnectionNotFound { .. })));
        assert!(handler.default_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let handler = ConnectionHandler::new();
        handler.register(settings(DEFAULT_DB_ALIAS)).await.unwrap();
        handler.register(settings("replica")).await.unwrap();

        assert_eq!(handler.connection_count().await, 2);
        assert!(handler.exists("replica").await);
        let default = handler.default_connection().await.unwrap();
        assert_eq!(default.alias(), DEFAULT_DB_ALIAS);

        let mut aliases = handler.aliases().await;
        aliases.sort();
        assert_eq!(aliases, vec!["default", "replica"]);
    }

    #[tokio::test]
    async fn test_duplicate_alias_rejected() {
        let handler = ConnectionHandler::new();
        handler.register(settings("main")).await.unwrap();
        let result = handler.register(settings("main")).await;
        assert!(matches!(result, Err(DbError::Connection { .. })));
    }
}
