//! HTTP server module.
//!
//! Serves a digest-protected endpoint with axum. The engine in
//! [`crate::auth`] makes every decision; this layer only translates between
//! HTTP and the engine.

mod guard;
mod listener;
mod metrics;
mod routes;
mod state;

pub use guard::{digest_guard, request_timeout, unauthorized, AuthenticatedUser};
pub use listener::HttpServer;
pub use metrics::{ActiveRequest, MetricsSnapshot, RequestMetrics};
pub use routes::router;
pub use state::AppState;
