pub mod health;
pub mod status;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analytics::handlers as analytics;
use crate::browse::handlers as browse;
use crate::ratings::handlers as ratings;
use crate::search::handlers as search;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/status", get(status::handle_status))
        .route("/api/v1/stats", get(status::handle_stats))
        // Discover / Search pages
        .route(
            "/api/v1/search/semantic",
            get(search::handle_semantic_search),
        )
        .route("/api/v1/search/keyword", get(search::handle_keyword_search))
        // Browse / Movie pages
        .route("/api/v1/genres", get(browse::handle_list_genres))
        .route("/api/v1/movies", get(browse::handle_browse))
        .route("/api/v1/movies/:movie_id", get(browse::handle_movie_details))
        .route("/api/v1/ratings", post(ratings::handle_upsert_rating))
        // Analytics page
        .route("/api/v1/analytics", get(analytics::handle_analytics))
        .with_state(state)
}
