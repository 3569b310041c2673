use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RatingAction {
    Created,
    Updated,
}

/// Row returned by the upsert statements.
#[derive(Debug, Clone, FromRow)]
pub struct RatingRow {
    pub rating_id: i32,
    pub rating: f64,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingOutcome {
    pub action: RatingAction,
    pub rating_id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: f64,
    pub rated_at: DateTime<Utc>,
}

impl RatingOutcome {
    pub fn from_row(action: RatingAction, user_id: i32, movie_id: i32, row: RatingRow) -> Self {
        RatingOutcome {
            action,
            rating_id: row.rating_id,
            user_id,
            movie_id,
            rating: row.rating,
            rated_at: row.rated_at,
        }
    }
}

/// A rating on the half-star scale 0.5 ..= 5.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingValue(f64);

impl RatingValue {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 5.0;

    pub fn new(value: f64) -> Result<Self, String> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(format!(
                "rating must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            ));
        }
        if (value * 2.0).fract() != 0.0 {
            return Err(format!("rating must be a multiple of 0.5, got {value}"));
        }
        Ok(RatingValue(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}
