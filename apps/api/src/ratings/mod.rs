pub mod handlers;

use serde::Deserialize;

use crate::models::rating::RatingValue;

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: f64,
}

impl RatingRequest {
    pub fn validate(&self) -> Result<RatingValue, String> {
        if self.user_id <= 0 {
            return Err(format!("user_id must be positive, got {}", self.user_id));
        }
        if self.movie_id <= 0 {
            return Err(format!("movie_id must be positive, got {}", self.movie_id));
        }
        RatingValue::new(self.rating)
    }
}
