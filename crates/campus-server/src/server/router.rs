//! Axum router construction.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/api/register", post(handlers::register_student))
        .route("/api/students", get(handlers::list_students))
        .route(
            "/api/student/:id",
            put(handlers::update_student).delete(handlers::delete_student),
        )
        .route("/api/count", get(handlers::student_count))
        .route("/api/admin/register", post(handlers::register_admin))
        .route("/api/admin/login", post(handlers::login_admin))
        .route("/api/admin/counts", get(handlers::admin_counts))
        .route("/api/admin/admins", get(handlers::list_admins))
        .route(
            "/api/admin/admins/:id",
            get(handlers::get_admin)
                .put(handlers::update_admin)
                .delete(handlers::delete_admin),
        )
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(middleware::cors())
        .with_state(state)
}
