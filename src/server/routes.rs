//! Route table.

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower::limit::ConcurrencyLimitLayer;

use super::guard::{digest_guard, request_timeout, AuthenticatedUser};
use super::state::AppState;

/// Build the application router.
///
/// `/health` is public. Every other path, including unknown ones, passes
/// the digest guard first.
pub fn router(state: AppState, max_concurrent_requests: usize) -> Router {
    let guarded = Router::new()
        .route("/", get(welcome))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), digest_guard));

    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .layer(middleware::from_fn_with_state(state.clone(), request_timeout))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests.max(1)))
        .with_state(state)
}

async fn welcome(Extension(user): Extension<AuthenticatedUser>) -> String {
    format!(
        "Welcome {}! The secret word is 'strawberry'!",
        user.username
    )
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.started_at.elapsed();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime.as_secs(),
        "realm": state.authenticator.realm(),
        "live_nonces": state.authenticator.registry().len(),
        "requests": state.metrics.snapshot(),
    }))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 Not Found\n")
}
