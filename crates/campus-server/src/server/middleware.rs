//! Axum middleware layers applied to the router.
//!
//! Includes request tracing, timeout enforcement, response compression and CORS.

use std::time::Duration;

use tower_http::cors::CorsLayer;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The browser frontend is served from a different origin than the API.
pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}
