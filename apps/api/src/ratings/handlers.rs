use axum::{extract::State, http::StatusCode, Json};

use crate::errors::AppError;
use crate::models::rating::{RatingAction, RatingOutcome};
use crate::ratings::RatingRequest;
use crate::state::AppState;

/// POST /api/v1/ratings
/// 201 when the rating is new, 200 when an existing one was updated.
pub async fn handle_upsert_rating(
    State(state): State<AppState>,
    Json(req): Json<RatingRequest>,
) -> Result<(StatusCode, Json<RatingOutcome>), AppError> {
    let store = state.store()?;
    let rating = req.validate().map_err(AppError::Validation)?;
    let outcome = store.upsert_rating(req.user_id, req.movie_id, rating).await?;
    let status = match outcome.action {
        RatingAction::Created => StatusCode::CREATED,
        RatingAction::Updated => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
