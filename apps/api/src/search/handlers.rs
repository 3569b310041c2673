use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::AppError;
use crate::models::movie::{MovieSummary, SimilarMovie};
use crate::search::{SearchParams, DEFAULT_KEYWORD_LIMIT, DEFAULT_SEMANTIC_LIMIT};
use crate::state::AppState;

/// GET /api/v1/search/semantic
pub async fn handle_semantic_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SimilarMovie>>, AppError> {
    let store = state.store()?;
    let limit = params
        .limit_or(DEFAULT_SEMANTIC_LIMIT)
        .map_err(AppError::Validation)?;
    Ok(Json(store.search_semantic(&params.q, limit).await?))
}

/// GET /api/v1/search/keyword
pub async fn handle_keyword_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<MovieSummary>>, AppError> {
    let store = state.store()?;
    let limit = params
        .limit_or(DEFAULT_KEYWORD_LIMIT)
        .map_err(AppError::Validation)?;
    Ok(Json(store.search_keyword(&params.q, limit).await?))
}
