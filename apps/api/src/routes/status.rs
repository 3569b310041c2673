use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::ConfigStatus;
use crate::db::{check_connection, ConnectionInfo};
use crate::errors::AppError;
use crate::models::movie::CatalogStats;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub config: ConfigStatus,
    /// `postgres`, `memory`, or `none` when unconfigured.
    pub backend: &'static str,
    pub connection: Option<ConnectionInfo>,
}

/// GET /api/v1/status
/// Masked configuration plus a live connection probe. Never fails.
pub async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connection = match &state.db {
        Some(pool) => Some(check_connection(pool).await),
        None => None,
    };
    Json(StatusResponse {
        config: state.config.status(),
        backend: state.store.as_ref().map_or("none", |s| s.backend()),
        connection,
    })
}

/// GET /api/v1/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<CatalogStats>, AppError> {
    Ok(Json(state.store()?.stats().await?))
}
