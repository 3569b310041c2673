use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::models::analytics::{
    AnalyticsReport, DecadeCount, GenreCount, GenreRating, TopMovie, YearlyRatings,
};
use crate::models::movie::{
    BrowsePage, BrowsedMovie, CatalogStats, Genre, MovieDetails, MovieDetailsRow, MovieSummary,
    SimilarMovie,
};
use crate::models::rating::{RatingAction, RatingOutcome, RatingRow, RatingValue};
use crate::store::pagination::PageRequest;
use crate::store::predicates::{push_where, BrowseFilter};
use crate::store::{MovieStore, StoreError, StoreResult, TOP_MOVIES_LIMIT, TOP_MOVIES_MIN_RATINGS};

/// Sorted genre names of the joined `g` rows; `{}` for untagged movies.
const GENRES_AGG: &str = "COALESCE(ARRAY_AGG(DISTINCT g.genre_name ORDER BY g.genre_name) \
     FILTER (WHERE g.genre_name IS NOT NULL), '{}') AS genres";

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

/// Catalog backed by the AlloyDB/PostgreSQL schema.
pub struct PgStore {
    pool: PgPool,
    embedding_model: String,
}

impl PgStore {
    pub fn new(pool: PgPool, embedding_model: impl Into<String>) -> Self {
        PgStore {
            pool,
            embedding_model: embedding_model.into(),
        }
    }
}

/// `%query%` with LIKE metacharacters escaped, so the query matches literally.
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Builds the page query: filter, aggregate ratings, apply the floor, slice,
/// then attach genre names to the sliced rows only.
fn browse_page_query(filter: &BrowseFilter, page: PageRequest) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "WITH filtered AS (SELECT m.movie_id, m.title, m.year, m.summary FROM movies m",
    );
    push_where(&mut qb, &filter.predicates());
    qb.push(
        "), rated AS (\
         SELECT f.movie_id, f.title, f.year, f.summary, \
         COALESCE(AVG(r.rating), 0) AS mean_rating, \
         ROUND(COALESCE(AVG(r.rating), 0)::numeric, 2)::float8 AS avg_rating, \
         COUNT(r.rating_id) AS rating_count \
         FROM filtered f LEFT JOIN ratings r ON r.movie_id = f.movie_id \
         GROUP BY f.movie_id, f.title, f.year, f.summary",
    );
    if let Some(floor) = filter.rating_floor() {
        qb.push(" HAVING COALESCE(AVG(r.rating), 0) >= ")
            .push_bind(floor);
    }
    qb.push(" ORDER BY mean_rating DESC, rating_count DESC, f.movie_id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    qb.push(") SELECT rated.movie_id, rated.title, rated.year, rated.summary, ")
        .push("rated.avg_rating, rated.rating_count, ")
        .push(GENRES_AGG)
        .push(
            " FROM rated \
             LEFT JOIN movie_genres mg ON mg.movie_id = rated.movie_id \
             LEFT JOIN genres g ON g.genre_id = mg.genre_id \
             GROUP BY rated.movie_id, rated.title, rated.year, rated.summary, \
             rated.mean_rating, rated.avg_rating, rated.rating_count \
             ORDER BY rated.mean_rating DESC, rated.rating_count DESC, rated.movie_id",
        );
    qb
}

/// Same predicates as the page query, minus the rating floor.
fn browse_count_query(filter: &BrowseFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM movies m");
    push_where(&mut qb, &filter.predicates());
    qb
}

/// Maps a SQLSTATE and constraint name from a rating write onto a store error.
/// `None` means the error is not a constraint violation we translate.
fn classify_write_violation(
    code: Option<&str>,
    constraint: Option<&str>,
    user_id: i32,
    movie_id: i32,
) -> Option<StoreError> {
    match code? {
        FOREIGN_KEY_VIOLATION => {
            let on_user = constraint.is_some_and(|name| name.contains("user"));
            Some(if on_user {
                StoreError::Missing {
                    entity: "user",
                    id: user_id,
                }
            } else {
                StoreError::Missing {
                    entity: "movie",
                    id: movie_id,
                }
            })
        }
        UNIQUE_VIOLATION => Some(StoreError::Conflict(format!(
            "rating for user {user_id} and movie {movie_id} was written concurrently"
        ))),
        _ => None,
    }
}

fn map_write_error(err: sqlx::Error, user_id: i32, movie_id: i32) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code();
        if let Some(mapped) =
            classify_write_violation(code.as_deref(), db_err.constraint(), user_id, movie_id)
        {
            return mapped;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl MovieStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn stats(&self) -> StoreResult<CatalogStats> {
        Ok(sqlx::query_as::<_, CatalogStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM movies) AS movie_count,
                (SELECT COUNT(*) FROM ratings) AS rating_count,
                (SELECT COUNT(*) FROM users) AS user_count,
                (SELECT COUNT(*) FROM genres) AS genre_count
            "#,
        )
        .fetch_one(&self.pool)
        .await?)
    }

    async fn search_semantic(&self, query: &str, limit: u32) -> StoreResult<Vec<SimilarMovie>> {
        debug!(model = %self.embedding_model, limit, "Semantic search");
        // `<=>` is cosine distance; the inner ORDER BY/LIMIT is what the ScaNN index serves.
        let sql = format!(
            r#"
            WITH query_embedding AS (
                SELECT embedding($1, $2)::vector AS embedding
            ),
            nearest AS (
                SELECT m.movie_id, m.title, m.year, m.summary,
                       m.summary_embedding <=> q.embedding AS distance
                FROM movies m
                CROSS JOIN query_embedding q
                WHERE m.summary_embedding IS NOT NULL
                ORDER BY distance
                LIMIT $3
            )
            SELECT n.movie_id, n.title, n.year, n.summary,
                   ROUND((1 - n.distance)::numeric, 3)::float8 AS similarity,
                   {GENRES_AGG}
            FROM nearest n
            LEFT JOIN movie_genres mg ON mg.movie_id = n.movie_id
            LEFT JOIN genres g ON g.genre_id = mg.genre_id
            GROUP BY n.movie_id, n.title, n.year, n.summary, n.distance
            ORDER BY n.distance
            "#
        );
        Ok(sqlx::query_as::<_, SimilarMovie>(&sql)
            .bind(&self.embedding_model)
            .bind(query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn search_keyword(&self, query: &str, limit: u32) -> StoreResult<Vec<MovieSummary>> {
        debug!(limit, "Keyword search");
        let sql = format!(
            r#"
            SELECT m.movie_id, m.title, m.year, m.summary, {GENRES_AGG}
            FROM movies m
            LEFT JOIN movie_genres mg ON mg.movie_id = m.movie_id
            LEFT JOIN genres g ON g.genre_id = mg.genre_id
            WHERE m.title ILIKE $1 OR m.summary ILIKE $1
            GROUP BY m.movie_id, m.title, m.year, m.summary
            ORDER BY CASE WHEN m.title ILIKE $1 THEN 0 ELSE 1 END, m.title
            LIMIT $2
            "#
        );
        Ok(sqlx::query_as::<_, MovieSummary>(&sql)
            .bind(like_pattern(query))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_genres(&self) -> StoreResult<Vec<Genre>> {
        Ok(sqlx::query_as::<_, Genre>(
            "SELECT genre_id, genre_name FROM genres ORDER BY genre_name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn browse(&self, filter: &BrowseFilter, page: PageRequest) -> StoreResult<BrowsePage> {
        debug!(?filter, page = page.page, page_size = page.page_size, "Browse");

        let movies = browse_page_query(filter, page)
            .build_query_as::<BrowsedMovie>()
            .fetch_all(&self.pool)
            .await?;

        let (total_count,) = browse_count_query(filter)
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await?;

        Ok(BrowsePage {
            movies,
            total_count,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages(total_count),
        })
    }

    async fn movie_details(&self, movie_id: i32) -> StoreResult<Option<MovieDetails>> {
        // Ratings and genres are aggregated separately so neither join multiplies the other.
        let row = sqlx::query_as::<_, MovieDetailsRow>(
            r#"
            SELECT
                m.movie_id,
                m.title,
                m.year,
                m.summary,
                COALESCE(rs.avg_rating, 0)::float8 AS avg_rating,
                COALESCE(rs.rating_count, 0) AS rating_count,
                COALESCE((
                    SELECT ARRAY_AGG(g.genre_name ORDER BY g.genre_name)
                    FROM movie_genres mg
                    JOIN genres g ON g.genre_id = mg.genre_id
                    WHERE mg.movie_id = m.movie_id
                ), '{}') AS genres,
                l.imdb_id::text AS imdb_id,
                l.tmdb_id::text AS tmdb_id
            FROM movies m
            LEFT JOIN (
                SELECT movie_id,
                       ROUND(AVG(rating)::numeric, 2) AS avg_rating,
                       COUNT(rating_id) AS rating_count
                FROM ratings
                WHERE movie_id = $1
                GROUP BY movie_id
            ) rs ON rs.movie_id = m.movie_id
            LEFT JOIN links l ON l.movie_id = m.movie_id
            WHERE m.movie_id = $1
            "#,
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MovieDetails::from))
    }

    async fn upsert_rating(
        &self,
        user_id: i32,
        movie_id: i32,
        rating: RatingValue,
    ) -> StoreResult<RatingOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT rating_id FROM ratings WHERE user_id = $1 AND movie_id = $2",
        )
        .bind(user_id)
        .bind(movie_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (action, row) = match existing {
            Some(rating_id) => {
                let row = sqlx::query_as::<_, RatingRow>(
                    r#"
                    UPDATE ratings
                    SET rating = $1, rated_at = CURRENT_TIMESTAMP
                    WHERE rating_id = $2
                    RETURNING rating_id, rating::float8 AS rating, rated_at::timestamptz AS rated_at
                    "#,
                )
                .bind(rating.get())
                .bind(rating_id)
                .fetch_one(&mut *tx)
                .await?;
                (RatingAction::Updated, row)
            }
            None => {
                let row = sqlx::query_as::<_, RatingRow>(
                    r#"
                    INSERT INTO ratings (user_id, movie_id, rating, rated_at)
                    VALUES ($1, $2, $3, CURRENT_TIMESTAMP)
                    RETURNING rating_id, rating::float8 AS rating, rated_at::timestamptz AS rated_at
                    "#,
                )
                .bind(user_id)
                .bind(movie_id)
                .bind(rating.get())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, user_id, movie_id))?;
                (RatingAction::Created, row)
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_write_error(e, user_id, movie_id))?;

        info!(
            user_id,
            movie_id,
            rating_id = row.rating_id,
            ?action,
            "Rating saved"
        );
        Ok(RatingOutcome::from_row(action, user_id, movie_id, row))
    }

    async fn analytics(&self) -> StoreResult<AnalyticsReport> {
        let top_movies = sqlx::query_as::<_, TopMovie>(
            r#"
            SELECT m.title, m.year,
                   ROUND(AVG(r.rating)::numeric, 2)::float8 AS avg_rating,
                   COUNT(r.rating_id) AS rating_count
            FROM movies m
            JOIN ratings r ON r.movie_id = m.movie_id
            GROUP BY m.movie_id, m.title, m.year
            HAVING COUNT(r.rating_id) >= $1
            ORDER BY AVG(r.rating) DESC
            LIMIT $2
            "#,
        )
        .bind(TOP_MOVIES_MIN_RATINGS)
        .bind(TOP_MOVIES_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        let genre_distribution = sqlx::query_as::<_, GenreCount>(
            r#"
            SELECT g.genre_name AS genre, COUNT(DISTINCT mg.movie_id) AS count
            FROM genres g
            JOIN movie_genres mg ON mg.genre_id = g.genre_id
            GROUP BY g.genre_id, g.genre_name
            ORDER BY count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ratings_by_year = sqlx::query_as::<_, YearlyRatings>(
            r#"
            SELECT EXTRACT(YEAR FROM rated_at)::int AS year,
                   COUNT(*) AS count,
                   ROUND(AVG(rating)::numeric, 2)::float8 AS avg_rating
            FROM ratings
            WHERE rated_at IS NOT NULL
            GROUP BY EXTRACT(YEAR FROM rated_at)
            ORDER BY year
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let avg_rating_by_genre = sqlx::query_as::<_, GenreRating>(
            r#"
            SELECT g.genre_name AS genre,
                   ROUND(AVG(r.rating)::numeric, 2)::float8 AS avg_rating,
                   COUNT(r.rating_id) AS rating_count
            FROM genres g
            JOIN movie_genres mg ON mg.genre_id = g.genre_id
            JOIN ratings r ON r.movie_id = mg.movie_id
            GROUP BY g.genre_id, g.genre_name
            ORDER BY avg_rating DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let decades: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT (year / 10) * 10 AS decade, COUNT(*) AS count
            FROM movies
            WHERE year IS NOT NULL
            GROUP BY (year / 10) * 10
            ORDER BY decade
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AnalyticsReport {
            top_movies,
            genre_distribution,
            ratings_by_year,
            avg_rating_by_genre,
            movies_by_decade: decades
                .into_iter()
                .map(|(decade, count)| DecadeCount::new(decade, count))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_wraps_query() {
        assert_eq!(like_pattern("robot"), "%robot%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\"), "%c:\\\\%");
    }

    #[test]
    fn test_count_query_ignores_rating_floor() {
        let filter = BrowseFilter {
            year_min: Some(1990),
            rating_min: Some(4.0),
            ..Default::default()
        };
        let qb = browse_count_query(&filter);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM movies m WHERE m.year >= $1");
    }

    #[test]
    fn test_page_query_applies_floor_before_slicing() {
        let filter = BrowseFilter {
            genre_id: Some(2),
            rating_min: Some(3.5),
            ..Default::default()
        };
        let qb = browse_page_query(&filter, PageRequest::default());
        let sql = qb.sql();
        let having = sql.find("HAVING COALESCE(AVG(r.rating), 0) >= $2").unwrap();
        let limit = sql.find("LIMIT $3 OFFSET $4").unwrap();
        let genres = sql.find("ARRAY_AGG").unwrap();
        assert!(having < limit);
        assert!(limit < genres);
    }

    #[test]
    fn test_page_query_sorts_on_unrounded_mean() {
        let qb = browse_page_query(&BrowseFilter::default(), PageRequest::default());
        let sql = qb.sql();
        assert!(sql.contains("ORDER BY mean_rating DESC, rating_count DESC, f.movie_id"));
        assert!(sql.contains("ORDER BY rated.mean_rating DESC"));
        assert!(!sql.contains("ORDER BY avg_rating"));
        assert!(!sql.contains("ORDER BY rated.avg_rating"));
    }

    #[test]
    fn test_foreign_key_violation_names_user_or_movie() {
        let on_user = classify_write_violation(
            Some(FOREIGN_KEY_VIOLATION),
            Some("ratings_user_id_fkey"),
            7,
            42,
        );
        assert!(matches!(
            on_user,
            Some(StoreError::Missing { entity: "user", id: 7 })
        ));

        let on_movie = classify_write_violation(
            Some(FOREIGN_KEY_VIOLATION),
            Some("ratings_movie_id_fkey"),
            7,
            42,
        );
        assert!(matches!(
            on_movie,
            Some(StoreError::Missing { entity: "movie", id: 42 })
        ));
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let mapped = classify_write_violation(
            Some(UNIQUE_VIOLATION),
            Some("ratings_user_id_movie_id_key"),
            7,
            42,
        );
        match mapped {
            Some(StoreError::Conflict(msg)) => assert!(msg.contains("user 7 and movie 42")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_other_codes_are_not_translated() {
        assert!(classify_write_violation(Some("23502"), None, 7, 42).is_none());
        assert!(classify_write_violation(None, None, 7, 42).is_none());
    }

    #[test]
    fn test_page_query_without_floor_has_no_having() {
        let qb = browse_page_query(&BrowseFilter::default(), PageRequest::default());
        assert!(!qb.sql().contains("HAVING"));
        assert!(qb.sql().contains("LIMIT $1 OFFSET $2"));
    }
}
