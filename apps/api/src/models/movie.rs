use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Genre {
    pub genre_id: i32,
    pub genre_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct CatalogStats {
    pub movie_count: i64,
    pub rating_count: i64,
    pub user_count: i64,
    pub genre_count: i64,
}

/// Uniform search hit shape. `genres` is sorted and empty when untagged.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MovieSummary {
    pub movie_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub summary: Option<String>,
    pub genres: Vec<String>,
}

/// Semantic search hit; `similarity` is `1 - cosine distance`, 3 decimals.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SimilarMovie {
    pub movie_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub summary: Option<String>,
    pub similarity: f64,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BrowsedMovie {
    pub movie_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub summary: Option<String>,
    /// 0 when the movie has no ratings.
    pub avg_rating: f64,
    pub rating_count: i64,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowsePage {
    pub movies: Vec<BrowsedMovie>,
    /// Ignores the rating floor; see `store::predicates::BrowseFilter`.
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, FromRow)]
pub struct MovieDetailsRow {
    pub movie_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub summary: Option<String>,
    pub avg_rating: f64,
    pub rating_count: i64,
    pub genres: Vec<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetails {
    pub movie_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub summary: Option<String>,
    pub avg_rating: f64,
    pub rating_count: i64,
    pub genres: Vec<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
    pub imdb_url: Option<String>,
    pub tmdb_url: Option<String>,
}

impl From<MovieDetailsRow> for MovieDetails {
    fn from(row: MovieDetailsRow) -> Self {
        let imdb_url = row
            .imdb_id
            .as_deref()
            .map(|id| format!("https://www.imdb.com/title/{id}/"));
        let tmdb_url = row
            .tmdb_id
            .as_deref()
            .map(|id| format!("https://www.themoviedb.org/movie/{id}"));
        MovieDetails {
            movie_id: row.movie_id,
            title: row.title,
            year: row.year,
            summary: row.summary,
            avg_rating: row.avg_rating,
            rating_count: row.rating_count,
            genres: row.genres,
            imdb_id: row.imdb_id,
            tmdb_id: row.tmdb_id,
            imdb_url,
            tmdb_url,
        }
    }
}
