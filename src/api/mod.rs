//! HTTP API layer: composition root (`server`), cross-cutting concerns
//! (`middleware`), and per-resource handlers (`routes`).

pub mod middleware;
pub mod routes;
pub mod server;

pub use middleware::{RateLimitConfig, RateLimiter, RateLimitState, ValidationError};
pub use server::{AppState, SharedAppState};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Build the full application router: every resource router, layered
/// with CORS, rate limiting, and security headers, bound to a concrete
/// `SharedAppState`.
pub fn build_router(state: SharedAppState) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));

    routes::router()
        .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, middleware::rate_limit_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
