use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::errors::AppError;
use crate::store::MovieStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// `None` when the database is not configured; data routes answer 503.
    pub store: Option<Arc<dyn MovieStore>>,
    /// Present only for the Postgres backend; probed by the status route.
    pub db: Option<PgPool>,
    pub config: Config,
}

impl AppState {
    pub fn store(&self) -> Result<&dyn MovieStore, AppError> {
        self.store.as_deref().ok_or(AppError::NotConfigured)
    }
}
