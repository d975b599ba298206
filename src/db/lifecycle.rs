//! Per-request connection housekeeping.
//!
//! On `request_started` every connection's query log is cleared. On both
//! `request_started` and `request_finished` every connection is asked to close
//! itself if it is unusable or past its max age.
//!
//! Requests also mark themselves active on every connection between the two
//! signals, so a finishing request never closes a pool another request is using.

use crate::db::handler::ConnectionHandler;
use crate::signals::RequestSignals;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::debug;

pub const RESET_QUERIES_RECEIVER: &str = "portico.db.reset_queries";
pub const CLOSE_OLD_CONNECTIONS_RECEIVER: &str = "portico.db.close_old_connections";
pub const BEGIN_REQUEST_RECEIVER: &str = "portico.db.begin_request";
pub const END_REQUEST_RECEIVER: &str = "portico.db.end_request";

/// Clear the query log of every registered connection.
pub async fn reset_queries(handler: &ConnectionHandler) {
    for wrapper in handler.all().await {
        wrapper.queries_log().clear();
    }
}

/// Close every connection that is unusable or obsolete.
///
/// Connections are checked concurrently; no order is implied. Returns how many
/// connections were closed.
pub async fn close_old_connections(handler: &ConnectionHandler) -> usize {
    let connections = handler.all().await;
    let closed = join_all(
        connections
            .iter()
            .map(|wrapper| wrapper.close_if_unusable_or_obsolete()),
    )
    .await
    .into_iter()
    .filter(|closed| *closed)
    .count();

    if closed > 0 {
        debug!(closed, "Closed old connections");
    }
    closed
}

/// Mark a request as in flight on every registered connection.
pub async fn begin_request(handler: &ConnectionHandler) {
    for wrapper in handler.all().await {
        wrapper.begin_request().await;
    }
}

/// Undo [`begin_request`].
pub async fn end_request(handler: &ConnectionHandler) {
    for wrapper in handler.all().await {
        wrapper.end_request().await;
    }
}

/// Hook connection housekeeping into the request signals.
///
/// `request_started` runs reset, close check, then begin. `request_finished`
/// runs end, then the close check.
pub fn connect_request_signals(signals: &RequestSignals, handler: Arc<ConnectionHandler>) {
    let h = Arc::clone(&handler);
    signals
        .request_started
        .connect(RESET_QUERIES_RECEIVER, move |_event| {
            let handler = Arc::clone(&h);
            async move {
                reset_queries(&handler).await;
                Ok(())
            }
        });

    let h = Arc::clone(&handler);
    signals
        .request_finished
        .connect(END_REQUEST_RECEIVER, move |_event| {
            let handler = Arc::clone(&h);
            async move {
                end_request(&handler).await;
                Ok(())
            }
        });

    for signal in [&signals.request_started, &signals.request_finished] {
        let h = Arc::clone(&handler);
        signal.connect(CLOSE_OLD_CONNECTIONS_RECEIVER, move |_event| {
            let handler = Arc::clone(&h);
            async move {
                close_old_connections(&handler).await;
                Ok(())
            }
        });
    }

    let h = Arc::clone(&handler);
    signals
        .request_started
        .connect(BEGIN_REQUEST_RECEIVER, move |_event| {
            let handler = Arc::clone(&h);
            async move {
                begin_request(&handler).await;
                Ok(())
            }
        });
}
