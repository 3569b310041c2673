//! Data access for the movie catalog.
//!
//! Every read and write the API exposes goes through [`MovieStore`]. Handlers
//! never touch the pool directly.

pub mod memory;
pub mod pagination;
pub mod postgres;
pub mod predicates;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::analytics::AnalyticsReport;
use crate::models::movie::{
    BrowsePage, CatalogStats, Genre, MovieDetails, MovieSummary, SimilarMovie,
};
use crate::models::rating::{RatingOutcome, RatingValue};
use crate::store::pagination::PageRequest;
use crate::store::predicates::BrowseFilter;

/// Ratings a movie needs before it can appear in the top-rated list.
pub const TOP_MOVIES_MIN_RATINGS: i64 = 50;
pub const TOP_MOVIES_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: i32 },

    #[error("{0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Short backend name reported by the status route.
    fn backend(&self) -> &'static str;

    /// Counts of movies, ratings, users and genres.
    async fn stats(&self) -> StoreResult<CatalogStats>;

    /// Movies ordered by embedding distance to `query`, closest first.
    async fn search_semantic(&self, query: &str, limit: u32) -> StoreResult<Vec<SimilarMovie>>;

    /// Case-insensitive substring match on title or summary. Title matches
    /// rank before summary-only matches, then by title.
    async fn search_keyword(&self, query: &str, limit: u32) -> StoreResult<Vec<MovieSummary>>;

    async fn list_genres(&self) -> StoreResult<Vec<Genre>>;

    async fn browse(&self, filter: &BrowseFilter, page: PageRequest) -> StoreResult<BrowsePage>;

    async fn movie_details(&self, movie_id: i32) -> StoreResult<Option<MovieDetails>>;

    /// Creates the (user, movie) rating or updates it in place, keeping its id.
    async fn upsert_rating(
        &self,
        user_id: i32,
        movie_id: i32,
        rating: RatingValue,
    ) -> StoreResult<RatingOutcome>;

    async fn analytics(&self) -> StoreResult<AnalyticsReport>;
}
