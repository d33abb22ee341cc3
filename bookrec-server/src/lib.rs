pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rebuild;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// HTTP routes served by the recommendation service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/recommendations", post(handlers::recommend))
        .route("/recommendations/:book_id", get(handlers::recommend_for_book))
        .route("/index/rebuild", post(handlers::rebuild_index))
        .route("/index/stats", get(handlers::index_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
