//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_handler, get_handler, health_handler, invalidate_handler, mget_handler,
    reset_stats_handler, set_handler, stats_handler, warmup_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a value under a category
/// - `GET /get/:category/:key` - Retrieve a value
/// - `POST /mget` - Retrieve many values of one category
/// - `DELETE /del/:category/:key` - Delete a key from both tiers
/// - `DELETE /invalidate/:pattern` - Delete every matching key
/// - `POST /warmup` - Bulk-load entries
/// - `DELETE /clear` - Empty both tiers and reset statistics
/// - `GET /stats` / `POST /stats/reset` - Statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:category/:key", get(get_handler))
        .route("/mget", post(mget_handler))
        .route("/del/:category/:key", delete(delete_handler))
        .route("/invalidate/:pattern", delete(invalidate_handler))
        .route("/warmup", post(warmup_handler))
        .route("/clear", delete(clear_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/reset", post(reset_stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
