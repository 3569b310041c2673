use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::browse::BrowseParams;
use crate::errors::AppError;
use crate::models::movie::{BrowsePage, Genre, MovieDetails};
use crate::state::AppState;

/// GET /api/v1/genres
pub async fn handle_list_genres(
    State(state): State<AppState>,
) -> Result<Json<Vec<Genre>>, AppError> {
    Ok(Json(state.store()?.list_genres().await?))
}

/// GET /api/v1/movies
pub async fn handle_browse(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<BrowsePage>, AppError> {
    let store = state.store()?;
    let (filter, page) = params.into_request().map_err(AppError::Validation)?;
    Ok(Json(store.browse(&filter, page).await?))
}

/// GET /api/v1/movies/:movie_id
pub async fn handle_movie_details(
    State(state): State<AppState>,
    Path(movie_id): Path<i32>,
) -> Result<Json<MovieDetails>, AppError> {
    let details = state
        .store()?
        .movie_details(movie_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Movie with ID {movie_id} not found")))?;
    Ok(Json(details))
}
