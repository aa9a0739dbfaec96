use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:task_id", delete(handlers::dispose_session))
        .route("/sessions/:task_id/end", post(handlers::end_session))
        .route("/sessions/:task_id/retry", post(handlers::retry_session))
        // Session queries
        .route("/sessions/:task_id/status", get(handlers::get_session_status))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // The assessment UI is served from a different origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
