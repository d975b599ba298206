use crate::signals::{RequestEvent, RequestSignals};
use axum::Router;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Per-request data, exposed to handlers as an extractor and to templates as
/// the `request` context variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub request_id: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub current_app: Option<String>,
}

impl RequestInfo {
    pub fn new(
        request_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            method: method.into(),
            path: path.into(),
            current_app: None,
        }
    }

    pub fn with_current_app(mut self, current_app: impl Into<String>) -> Self {
        self.current_app = Some(current_app.into());
        self
    }

    pub fn event(&self) -> RequestEvent {
        RequestEvent::new(&self.request_id, &self.method, &self.path)
    }

    fn from_parts(parts: &Parts) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            parts.method.as_str(),
            parts.uri.path(),
        )
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Outside the lifecycle middleware a fresh id is generated
        Ok(parts
            .extensions
            .get::<RequestInfo>()
            .cloned()
            .unwrap_or_else(|| Self::from_parts(parts)))
    }
}

/// Send `request_started`, run the handler, then send `request_finished`.
///
/// A failing `request_started` receiver turns into a 500 without running the
/// handler. `request_finished` is still sent in that case so the per-connection
/// request counts stay balanced. A failing `request_finished` receiver is
/// logged and the response is returned unchanged.
pub async fn request_lifecycle(
    State(signals): State<Arc<RequestSignals>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let info = RequestInfo::from_parts(&parts);
    parts.extensions.insert(info.clone());
    let event = info.event();

    let response = match signals.request_started.send(&event).await {
        Ok(()) => next.run(Request::from_parts(parts, body)).await,
        Err(err) => {
            error!(request_id = %info.request_id, error = %err, "request_started receiver failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    if let Err(err) = signals.request_finished.send(&event).await {
        error!(request_id = %info.request_id, error = %err, "request_finished receiver failed");
    }
    debug!(
        request_id = %info.request_id,
        method = %info.method,
        path = %info.path,
        status = response.status().as_u16(),
        "Request finished"
    );
    response
}

/// Wrap every route of `router` in [`request_lifecycle`].
pub fn with_request_lifecycle(router: Router, signals: Arc<RequestSignals>) -> Router {
    router.layer(middleware::from_fn_with_state(signals, request_lifecycle))
}
