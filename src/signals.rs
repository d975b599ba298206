//! Request lifecycle signals.
//!
//! A [`Signal`] is an ordered list of named async receivers. The HTTP middleware
//! sends `request_started` before a handler runs and `request_finished` after
//! the response is built; anything that needs per-request housekeeping
//! connects to them.

use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Payload passed to every receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    pub request_id: String,
    pub method: String,
    pub path: String,
}

impl RequestEvent {
    pub fn new(
        request_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            method: method.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("receiver '{receiver}' of signal '{signal}' failed: {source}")]
pub struct SignalError {
    pub signal: &'static str,
    pub receiver: String,
    #[source]
    pub source: DbError,
}

type Receiver = Arc<dyn Fn(RequestEvent) -> BoxFuture<'static, DbResult<()>> + Send + Sync>;

pub struct Signal {
    name: &'static str,
    receivers: RwLock<Vec<(String, Receiver)>>,
}

impl Signal {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            receivers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Connect a receiver under a unique name.
    ///
    /// Returns false, and keeps the existing receiver, if the name is taken.
    pub fn connect<F, Fut>(&self, name: impl Into<String>, receiver: F) -> bool
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DbResult<()>> + Send + 'static,
    {
        let name = name.into();
        let mut receivers = self.write();
        if receivers.iter().any(|(existing, _)| *existing == name) {
            debug!(signal = self.name, receiver = %name, "Receiver already connected");
            return false;
        }
        let receiver: Receiver =
            Arc::new(move |event| -> BoxFuture<'static, DbResult<()>> { Box::pin(receiver(event)) });
        receivers.push((name, receiver));
        true
    }

    /// Remove a receiver by name. Returns whether one was removed.
    pub fn disconnect(&self, name: &str) -> bool {
        let mut receivers = self.write();
        let before = receivers.len();
        receivers.retain(|(existing, _)| existing != name);
        receivers.len() != before
    }

    pub fn receiver_count(&self) -> usize {
        self.read().len()
    }

    /// Call receivers in connection order, stopping at the first failure.
    pub async fn send(&self, event: &RequestEvent) -> Result<(), SignalError> {
        for (name, receiver) in self.snapshot() {
            receiver(event.clone()).await.map_err(|source| SignalError {
                signal: self.name,
                receiver: name,
                source,
            })?;
        }
        Ok(())
    }

    /// Call every receiver and report each outcome, in connection order.
    pub async fn send_robust(&self, event: &RequestEvent) -> Vec<(String, Result<(), SignalError>)> {
        let mut outcomes = Vec::new();
        for (name, receiver) in self.snapshot() {
            let outcome = receiver(event.clone()).await.map_err(|source| {
                warn!(signal = self.name, receiver = %name, error = %source, "Receiver failed");
                SignalError {
                    signal: self.name,
                    receiver: name.clone(),
                    source,
                }
            });
            outcomes.push((name, outcome));
        }
        outcomes
    }

    // Receivers are cloned out so no lock is held across an await.
    fn snapshot(&self) -> Vec<(String, Receiver)> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<(String, Receiver)>> {
        self.receivers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<(String, Receiver)>> {
        self.receivers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.read().iter().map(|(name, _)| name.clone()).collect();
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("receivers", &names)
            .finish()
    }
}

/// The two request lifecycle signals.
#[derive(Debug)]
pub struct RequestSignals {
    pub request_started: Signal,
    pub request_finished: Signal,
}

impl RequestSignals {
    pub fn new() -> Self {
        Self {
            request_started: Signal::new("request_started"),
            request_finished: Signal::new("request_finished"),
        }
    }
}

impl Default for RequestSignals {
    fn default() -> Self {
        Self::new()
    }
}
