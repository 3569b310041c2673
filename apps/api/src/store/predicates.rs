use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};

/// One conjunctive browse filter over `movies m`. Values are always bound,
/// never formatted into the statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    InGenre(i32),
    YearFrom(i32),
    YearTo(i32),
}

impl Predicate {
    pub fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match *self {
            Predicate::InGenre(genre_id) => {
                qb.push(
                    "EXISTS (SELECT 1 FROM movie_genres mg \
                     WHERE mg.movie_id = m.movie_id AND mg.genre_id = ",
                )
                .push_bind(genre_id)
                .push(")");
            }
            Predicate::YearFrom(year) => {
                qb.push("m.year >= ").push_bind(year);
            }
            Predicate::YearTo(year) => {
                qb.push("m.year <= ").push_bind(year);
            }
        }
    }

    /// Same test evaluated in process. A movie without a year never matches a
    /// year bound, as with SQL NULL comparison.
    pub fn matches(&self, year: Option<i32>, genre_ids: &[i32]) -> bool {
        match *self {
            Predicate::InGenre(genre_id) => genre_ids.contains(&genre_id),
            Predicate::YearFrom(bound) => year.is_some_and(|y| y >= bound),
            Predicate::YearTo(bound) => year.is_some_and(|y| y <= bound),
        }
    }
}

/// Appends ` WHERE a AND b ...`; appends nothing for an empty list.
pub fn push_where(qb: &mut QueryBuilder<'_, Postgres>, predicates: &[Predicate]) {
    for (i, predicate) in predicates.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        predicate.push(qb);
    }
}

/// Browse filters as received from the caller.
///
/// The rating floor applies to an aggregate, so it is not a [`Predicate`]: it
/// becomes a `HAVING` clause on the page query and is left out of the total
/// count. `total_count` therefore overstates the result set while a floor is
/// active.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BrowseFilter {
    pub genre_id: Option<i32>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub rating_min: Option<f64>,
}

impl BrowseFilter {
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(genre_id) = self.genre_id {
            predicates.push(Predicate::InGenre(genre_id));
        }
        if let Some(year) = self.year_min {
            predicates.push(Predicate::YearFrom(year));
        }
        if let Some(year) = self.year_max {
            predicates.push(Predicate::YearTo(year));
        }
        predicates
    }

    /// A floor of 0 filters nothing and is treated as unset.
    pub fn rating_floor(&self) -> Option<f64> {
        self.rating_min.filter(|r| *r > 0.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.year_min, self.year_max) {
            if min > max {
                return Err(format!("year_min ({min}) must not exceed year_max ({max})"));
            }
        }
        if let Some(rating) = self.rating_min {
            if !(0.0..=5.0).contains(&rating) {
                return Err(format!("rating_min must be between 0 and 5, got {rating}"));
            }
        }
        Ok(())
    }
}
