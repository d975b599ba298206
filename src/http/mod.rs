//! axum integration.
//!
//! - Response types produced by the shortcuts
//! - Middleware that sends the request lifecycle signals
//! - A server wrapper with graceful shutdown

pub mod middleware;
pub mod response;
pub mod server;

pub use middleware::{RequestInfo, request_lifecycle, with_request_lifecycle};
pub use response::{DEFAULT_CONTENT_TYPE, HttpResponse, HttpResponseRedirect, REDIRECT_ALLOWED_SCHEMES};
pub use server::HttpServer;
