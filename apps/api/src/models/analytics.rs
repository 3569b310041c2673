use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TopMovie {
    pub title: String,
    pub year: Option<i32>,
    pub avg_rating: f64,
    pub rating_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenreCount {
    pub genre: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct YearlyRatings {
    pub year: i32,
    pub count: i64,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenreRating {
    pub genre: String,
    pub avg_rating: f64,
    pub rating_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecadeCount {
    /// e.g. `"1990s"`
    pub decade: String,
    pub count: i64,
}

impl DecadeCount {
    pub fn new(decade: i32, count: i64) -> Self {
        DecadeCount {
            decade: format!("{decade}s"),
            count,
        }
    }
}

/// The five dashboard aggregations, recomputed on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub top_movies: Vec<TopMovie>,
    pub genre_distribution: Vec<GenreCount>,
    pub ratings_by_year: Vec<YearlyRatings>,
    pub avg_rating_by_genre: Vec<GenreRating>,
    pub movies_by_decade: Vec<DecadeCount>,
}
