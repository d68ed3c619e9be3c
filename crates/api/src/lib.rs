//! HTTP API layer for chorus.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: JSON resources under `/api`
//! - **Extractors**: the resolved caller of each request
//! - **Middleware**: bearer credential resolution
//! - **Streaming**: WebSocket channels over the event bus
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

use axum::{Json, Router, middleware::from_fn_with_state, routing::get};
use serde_json::{Value, json};

pub use endpoints::router;
pub use middleware::AppState;
pub use streaming::streaming_handler;

/// Liveness probe.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Assemble the full application: `/api`, `/streaming` and `/health`, with
/// every request passing through credential resolution.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/streaming", get(streaming_handler))
        .nest("/api", router())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}
