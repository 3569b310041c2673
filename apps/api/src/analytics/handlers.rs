use axum::{extract::State, Json};
use tracing::debug;

use crate::errors::AppError;
use crate::models::analytics::AnalyticsReport;
use crate::state::AppState;

/// GET /api/v1/analytics
/// All five aggregations are recomputed from full scans on every call.
pub async fn handle_analytics(
    State(state): State<AppState>,
) -> Result<Json<AnalyticsReport>, AppError> {
    let report = state.store()?.analytics().await?;
    debug!(
        top_movies = report.top_movies.len(),
        genres = report.genre_distribution.len(),
        "Analytics computed"
    );
    Ok(Json(report))
}
