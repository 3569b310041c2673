use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::analytics::{
    AnalyticsReport, DecadeCount, GenreCount, GenreRating, TopMovie, YearlyRatings,
};
use crate::models::movie::{
    BrowsePage, BrowsedMovie, CatalogStats, Genre, MovieDetails, MovieDetailsRow, MovieSummary,
    SimilarMovie,
};
use crate::models::rating::{RatingAction, RatingOutcome, RatingValue};
use crate::models::round_to;
use crate::store::pagination::PageRequest;
use crate::store::predicates::BrowseFilter;
use crate::store::{MovieStore, StoreError, StoreResult, TOP_MOVIES_LIMIT, TOP_MOVIES_MIN_RATINGS};

pub const EMBEDDING_DIMENSIONS: usize = 256;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Catalog contents as loaded from a JSON seed file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub movies: Vec<SeedMovie>,
    #[serde(default)]
    pub users: Vec<i32>,
    #[serde(default)]
    pub ratings: Vec<SeedRating>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMovie {
    pub movie_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub summary: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRating {
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: f64,
    pub rated_at: Option<DateTime<Utc>>,
}

struct MovieRecord {
    movie: SeedMovie,
    /// Summary embedding, absent for movies without a summary.
    embedding: Option<Vec<f32>>,
}

struct RatingRecord {
    rating_id: i32,
    user_id: i32,
    movie_id: i32,
    rating: f64,
    rated_at: Option<DateTime<Utc>>,
}

struct Catalog {
    genres: Vec<Genre>,
    movies: Vec<MovieRecord>,
    users: BTreeSet<i32>,
    ratings: Vec<RatingRecord>,
    next_rating_id: i32,
}

impl Catalog {
    fn movie(&self, movie_id: i32) -> Option<&MovieRecord> {
        self.movies.iter().find(|m| m.movie.movie_id == movie_id)
    }

    fn genre_names(&self, movie: &SeedMovie) -> Vec<String> {
        let mut names: Vec<String> = self
            .genres
            .iter()
            .filter(|g| movie.genre_ids.contains(&g.genre_id))
            .map(|g| g.genre_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Unrounded mean (0 when unrated) and count.
    fn rating_stats(&self, movie_id: i32) -> (f64, i64) {
        let (sum, count) = self
            .ratings
            .iter()
            .filter(|r| r.movie_id == movie_id)
            .fold((0.0, 0i64), |(sum, count), r| (sum + r.rating, count + 1));
        if count == 0 {
            (0.0, 0)
        } else {
            (sum / count as f64, count)
        }
    }

    fn summary(&self, movie: &SeedMovie) -> MovieSummary {
        MovieSummary {
            movie_id: movie.movie_id,
            title: movie.title.clone(),
            year: movie.year,
            summary: movie.summary.clone(),
            genres: self.genre_names(movie),
        }
    }
}

/// In-process catalog with the same contracts as [`crate::store::postgres::PgStore`].
///
/// Summary embeddings come from [`embed_text`] at load time, standing in for the
/// precomputed `summary_embedding` column.
pub struct MemoryStore {
    catalog: RwLock<Catalog>,
}

impl MemoryStore {
    /// Fails when the seed rates the same (user, movie) pair twice.
    pub fn from_seed(seed: Seed) -> Result<Self> {
        let mut pairs = BTreeSet::new();
        for r in &seed.ratings {
            if !pairs.insert((r.user_id, r.movie_id)) {
                bail!(
                    "duplicate rating for user {} and movie {}",
                    r.user_id,
                    r.movie_id
                );
            }
        }

        let mut users: BTreeSet<i32> = seed.users.into_iter().collect();
        users.extend(seed.ratings.iter().map(|r| r.user_id));

        let movies = seed
            .movies
            .into_iter()
            .map(|movie| {
                let embedding = movie.summary.as_deref().map(embed_text);
                MovieRecord { movie, embedding }
            })
            .collect();

        let ratings: Vec<RatingRecord> = seed
            .ratings
            .into_iter()
            .zip(1..)
            .map(|(r, rating_id)| RatingRecord {
                rating_id,
                user_id: r.user_id,
                movie_id: r.movie_id,
                rating: r.rating,
                rated_at: r.rated_at,
            })
            .collect();
        let next_rating_id = ratings.len() as i32 + 1;

        Ok(MemoryStore {
            catalog: RwLock::new(Catalog {
                genres: seed.genres,
                movies,
                users,
                ratings,
                next_rating_id,
            }),
        })
    }

    pub async fn from_seed_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog seed {}", path.display()))?;
        let seed: Seed = serde_json::from_str(&raw)
            .with_context(|| format!("Catalog seed {} is not valid JSON", path.display()))?;
        info!(
            movies = seed.movies.len(),
            ratings = seed.ratings.len(),
            "Loaded catalog seed from {}",
            path.display()
        );
        Self::from_seed(seed)
            .with_context(|| format!("Catalog seed {} is inconsistent", path.display()))
    }
}

/// Hashed bag-of-words embedding, L2-normalized. Texts sharing words land
/// close together under cosine distance.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        vector[token_bucket(&token.to_lowercase())] += 1.0;
    }

    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vector {
            *x /= magnitude;
        }
    }
    vector
}

/// FNV-1a over the token bytes, so buckets do not depend on the toolchain.
fn token_bucket(token: &str) -> usize {
    let hash = token.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    (hash % EMBEDDING_DIMENSIONS as u64) as usize
}

/// `1 - cos(a, b)`; a zero vector is at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - f64::from(dot / (norm_a * norm_b))
}

#[async_trait]
impl MovieStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn stats(&self) -> StoreResult<CatalogStats> {
        let catalog = self.catalog.read().await;
        Ok(CatalogStats {
            movie_count: catalog.movies.len() as i64,
            rating_count: catalog.ratings.len() as i64,
            user_count: catalog.users.len() as i64,
            genre_count: catalog.genres.len() as i64,
        })
    }

    async fn search_semantic(&self, query: &str, limit: u32) -> StoreResult<Vec<SimilarMovie>> {
        let catalog = self.catalog.read().await;
        let query_embedding = embed_text(query);

        let mut scored: Vec<(f64, &SeedMovie)> = catalog
            .movies
            .iter()
            .filter_map(|record| {
                record
                    .embedding
                    .as_ref()
                    .map(|e| (cosine_distance(e, &query_embedding), &record.movie))
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(limit as usize);
        debug!(hits = scored.len(), "Semantic search");

        Ok(scored
            .into_iter()
            .map(|(distance, movie)| SimilarMovie {
                movie_id: movie.movie_id,
                title: movie.title.clone(),
                year: movie.year,
                summary: movie.summary.clone(),
                similarity: round_to(1.0 - distance, 3),
                genres: catalog.genre_names(movie),
            })
            .collect())
    }

    async fn search_keyword(&self, query: &str, limit: u32) -> StoreResult<Vec<MovieSummary>> {
        let catalog = self.catalog.read().await;
        let needle = query.to_lowercase();

        let mut hits: Vec<(bool, &SeedMovie)> = catalog
            .movies
            .iter()
            .filter_map(|record| {
                let movie = &record.movie;
                let in_title = movie.title.to_lowercase().contains(&needle);
                let in_summary = movie
                    .summary
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&needle));
                (in_title || in_summary).then_some((in_title, movie))
            })
            .collect();
        // title matches first (false sorts before true, so negate), then by title
        hits.sort_by(|a, b| (!a.0, &a.1.title).cmp(&(!b.0, &b.1.title)));
        hits.truncate(limit as usize);

        Ok(hits
            .into_iter()
            .map(|(_, movie)| catalog.summary(movie))
            .collect())
    }

    async fn list_genres(&self) -> StoreResult<Vec<Genre>> {
        let catalog = self.catalog.read().await;
        let mut genres = catalog.genres.clone();
        genres.sort_by(|a, b| a.genre_name.cmp(&b.genre_name));
        Ok(genres)
    }

    async fn browse(&self, filter: &BrowseFilter, page: PageRequest) -> StoreResult<BrowsePage> {
        let catalog = self.catalog.read().await;
        let predicates = filter.predicates();

        let matching: Vec<&SeedMovie> = catalog
            .movies
            .iter()
            .map(|record| &record.movie)
            .filter(|movie| {
                predicates
                    .iter()
                    .all(|p| p.matches(movie.year, &movie.genre_ids))
            })
            .collect();
        let total_count = matching.len() as i64;

        let mut rated: Vec<(f64, i64, &SeedMovie)> = matching
            .into_iter()
            .filter_map(|movie| {
                let (avg, count) = catalog.rating_stats(movie.movie_id);
                match filter.rating_floor() {
                    Some(floor) if avg < floor => None,
                    _ => Some((avg, count, movie)),
                }
            })
            .collect();
        rated.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(b.1.cmp(&a.1))
                .then(a.2.movie_id.cmp(&b.2.movie_id))
        });

        let movies = rated
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|(avg, rating_count, movie)| BrowsedMovie {
                movie_id: movie.movie_id,
                title: movie.title.clone(),
                year: movie.year,
                summary: movie.summary.clone(),
                avg_rating: round_to(avg, 2),
                rating_count,
                genres: catalog.genre_names(movie),
            })
            .collect();

        Ok(BrowsePage {
            movies,
            total_count,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages(total_count),
        })
    }

    async fn movie_details(&self, movie_id: i32) -> StoreResult<Option<MovieDetails>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.movie(movie_id).map(|record| {
            let movie = &record.movie;
            let (avg, rating_count) = catalog.rating_stats(movie_id);
            MovieDetails::from(MovieDetailsRow {
                movie_id,
                title: movie.title.clone(),
                year: movie.year,
                summary: movie.summary.clone(),
                avg_rating: round_to(avg, 2),
                rating_count,
                genres: catalog.genre_names(movie),
                imdb_id: movie.imdb_id.clone(),
                tmdb_id: movie.tmdb_id.clone(),
            })
        }))
    }

    async fn upsert_rating(
        &self,
        user_id: i32,
        movie_id: i32,
        rating: RatingValue,
    ) -> StoreResult<RatingOutcome> {
        let mut guard = self.catalog.write().await;
        let catalog = &mut *guard;
        if catalog.movie(movie_id).is_none() {
            return Err(StoreError::Missing {
                entity: "movie",
                id: movie_id,
            });
        }
        if !catalog.users.contains(&user_id) {
            return Err(StoreError::Missing {
                entity: "user",
                id: user_id,
            });
        }

        let now = Utc::now();
        let existing = catalog
            .ratings
            .iter_mut()
            .find(|r| r.user_id == user_id && r.movie_id == movie_id);

        let (action, rating_id) = match existing {
            Some(record) => {
                record.rating = rating.get();
                record.rated_at = Some(now);
                (RatingAction::Updated, record.rating_id)
            }
            None => {
                let rating_id = catalog.next_rating_id;
                catalog.next_rating_id += 1;
                catalog.ratings.push(RatingRecord {
                    rating_id,
                    user_id,
                    movie_id,
                    rating: rating.get(),
                    rated_at: Some(now),
                });
                (RatingAction::Created, rating_id)
            }
        };

        info!(user_id, movie_id, rating_id, ?action, "Rating saved");
        Ok(RatingOutcome {
            action,
            rating_id,
            user_id,
            movie_id,
            rating: rating.get(),
            rated_at: now,
        })
    }

    async fn analytics(&self) -> StoreResult<AnalyticsReport> {
        let catalog = self.catalog.read().await;

        let mut top: Vec<(f64, i64, &SeedMovie)> = catalog
            .movies
            .iter()
            .map(|record| {
                let (avg, count) = catalog.rating_stats(record.movie.movie_id);
                (avg, count, &record.movie)
            })
            .filter(|(_, count, _)| *count >= TOP_MOVIES_MIN_RATINGS)
            .collect();
        top.sort_by(|a, b| b.0.total_cmp(&a.0));
        let top_movies = top
            .into_iter()
            .take(TOP_MOVIES_LIMIT)
            .map(|(avg, count, movie)| TopMovie {
                title: movie.title.clone(),
                year: movie.year,
                avg_rating: round_to(avg, 2),
                rating_count: count,
            })
            .collect();

        let mut genre_distribution: Vec<GenreCount> = catalog
            .genres
            .iter()
            .map(|genre| GenreCount {
                genre: genre.genre_name.clone(),
                count: catalog
                    .movies
                    .iter()
                    .filter(|m| m.movie.genre_ids.contains(&genre.genre_id))
                    .count() as i64,
            })
            .filter(|g| g.count > 0)
            .collect();
        genre_distribution.sort_by(|a, b| b.count.cmp(&a.count));

        let mut by_year: BTreeMap<i32, (i64, f64)> = BTreeMap::new();
        for rating in &catalog.ratings {
            if let Some(rated_at) = rating.rated_at {
                let entry = by_year.entry(rated_at.year()).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += rating.rating;
            }
        }
        let ratings_by_year = by_year
            .into_iter()
            .map(|(year, (count, sum))| YearlyRatings {
                year,
                count,
                avg_rating: round_to(sum / count as f64, 2),
            })
            .collect();

        let mut avg_rating_by_genre: Vec<GenreRating> = catalog
            .genres
            .iter()
            .filter_map(|genre| {
                let (sum, count) = catalog
                    .ratings
                    .iter()
                    .filter(|r| {
                        catalog
                            .movie(r.movie_id)
                            .is_some_and(|m| m.movie.genre_ids.contains(&genre.genre_id))
                    })
                    .fold((0.0, 0i64), |(sum, count), r| (sum + r.rating, count + 1));
                (count > 0).then(|| GenreRating {
                    genre: genre.genre_name.clone(),
                    avg_rating: round_to(sum / count as f64, 2),
                    rating_count: count,
                })
            })
            .collect();
        avg_rating_by_genre.sort_by(|a, b| b.avg_rating.total_cmp(&a.avg_rating));

        let mut by_decade: BTreeMap<i32, i64> = BTreeMap::new();
        for record in &catalog.movies {
            if let Some(year) = record.movie.year {
                *by_decade.entry((year / 10) * 10).or_insert(0) += 1;
            }
        }
        let movies_by_decade = by_decade
            .into_iter()
            .map(|(decade, count)| DecadeCount::new(decade, count))
            .collect();

        Ok(AnalyticsReport {
            top_movies,
            genre_distribution,
            ratings_by_year,
            avg_rating_by_genre,
            movies_by_decade,
        })
    }
}

/// Small catalog shared by store and router tests.
#[cfg(test)]
pub(crate) fn sample_seed() -> Seed {
    use chrono::TimeZone;

    let genre = |genre_id: i32, name: &str| Genre {
        genre_id,
        genre_name: name.to_string(),
    };
    let movie = |movie_id: i32,
                 title: &str,
                 year: Option<i32>,
                 summary: Option<&str>,
                 genre_ids: &[i32]| SeedMovie {
        movie_id,
        title: title.to_string(),
        year,
        summary: summary.map(str::to_string),
        genre_ids: genre_ids.to_vec(),
        imdb_id: None,
        tmdb_id: None,
    };
    let at = |year: i32| Some(Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap());
    let rating = |user_id: i32, movie_id: i32, rating: f64, year: i32| SeedRating {
        user_id,
        movie_id,
        rating,
        rated_at: at(year),
    };

    let mut toy_story = movie(
        1,
        "Toy Story",
        Some(1995),
        Some("A cowboy doll is threatened by a new spaceman toy in a boy's bedroom."),
        &[1, 2],
    );
    toy_story.imdb_id = Some("tt0114709".to_string());
    toy_story.tmdb_id = Some("862".to_string());

    Seed {
        genres: vec![
            genre(1, "Animation"),
            genre(2, "Comedy"),
            genre(3, "Sci-Fi"),
            genre(4, "Drama"),
        ],
        movies: vec![
            toy_story,
            movie(
                2,
                "The Matrix",
                Some(1999),
                Some("A hacker learns that reality is a simulation run by machines."),
                &[3],
            ),
            movie(
                3,
                "Robot Dreams",
                Some(2023),
                Some("A lonely dog builds a robot friend in New York."),
                &[1, 4],
            ),
            movie(
                4,
                "WALL-E",
                Some(2008),
                Some("A small waste-collecting robot falls in love on an abandoned Earth."),
                &[1, 3],
            ),
            movie(
                5,
                "Casablanca",
                Some(1942),
                Some("A nightclub owner must choose between love and virtue in wartime."),
                &[4],
            ),
            movie(6, "Untitled Project", None, None, &[]),
        ],
        users: vec![1, 2, 3],
        ratings: vec![
            rating(1, 1, 4.0, 2015),
            rating(2, 1, 5.0, 2016),
            rating(1, 2, 5.0, 2016),
            rating(2, 2, 4.5, 2017),
            rating(3, 2, 4.0, 2017),
            rating(1, 4, 3.0, 2018),
            rating(1, 5, 2.0, 2018),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::from_seed(sample_seed()).unwrap()
    }

    #[test]
    fn test_embedding_is_normalized() {
        let v = embed_text("robot love story");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embed_text("").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_token_buckets_are_stable() {
        assert_eq!(token_bucket("robot"), 223);
        let v = embed_text("Robot robot");
        assert!((v[223] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_bounds() {
        let a = embed_text("robot");
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
        assert_eq!(cosine_distance(&a, &[0.0; EMBEDDING_DIMENSIONS]), 1.0);
    }

    #[tokio::test]
    async fn test_stats_counts_catalog() {
        let stats = store().stats().await.unwrap();
        assert_eq!(
            stats,
            CatalogStats {
                movie_count: 6,
                rating_count: 7,
                user_count: 3,
                genre_count: 4,
            }
        );
    }

    #[tokio::test]
    async fn test_semantic_results_in_non_increasing_similarity() {
        let hits = store().search_semantic("robot in love", 10).await.unwrap();
        assert_eq!(hits.len(), 5);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_semantic_exact_summary_ranks_first() {
        let query = "A small waste-collecting robot falls in love on an abandoned Earth.";
        let hits = store().search_semantic(query, 3).await.unwrap();
        assert_eq!(hits[0].title, "WALL-E");
        assert_eq!(hits[0].similarity, 1.0);
        assert!(hits[1].similarity < 1.0);
    }

    #[tokio::test]
    async fn test_semantic_skips_movies_without_embedding() {
        let hits = store().search_semantic("untitled", 10).await.unwrap();
        assert!(hits.iter().all(|h| h.movie_id != 6));
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_semantic_respects_limit() {
        let hits = store().search_semantic("robot", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_matches_title_or_summary_case_insensitively() {
        let hits = store().search_keyword("ROBOT", 20).await.unwrap();
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Robot Dreams", "WALL-E"]);
        for hit in &hits {
            let title = hit.title.to_lowercase();
            let summary = hit.summary.clone().unwrap_or_default().to_lowercase();
            assert!(title.contains("robot") || summary.contains("robot"));
        }
    }

    #[tokio::test]
    async fn test_keyword_title_matches_precede_summary_matches() {
        let hits = store().search_keyword("a", 20).await.unwrap();
        let first_summary_only = hits
            .iter()
            .position(|h| !h.title.to_lowercase().contains('a'))
            .unwrap_or(hits.len());
        assert!(hits[..first_summary_only]
            .iter()
            .all(|h| h.title.to_lowercase().contains('a')));
        assert!(hits[first_summary_only..]
            .iter()
            .all(|h| !h.title.to_lowercase().contains('a')));
        assert_eq!(hits[0].title, "Casablanca");
    }

    #[tokio::test]
    async fn test_keyword_empty_query_matches_everything() {
        let hits = store().search_keyword("", 20).await.unwrap();
        assert_eq!(hits.len(), 6);
    }

    #[tokio::test]
    async fn test_genres_sorted_by_name() {
        let genres = store().list_genres().await.unwrap();
        let names: Vec<&str> = genres.iter().map(|g| g.genre_name.as_str()).collect();
        assert_eq!(names, vec!["Animation", "Comedy", "Drama", "Sci-Fi"]);
    }

    #[tokio::test]
    async fn test_browse_respects_year_range() {
        let filter = BrowseFilter {
            year_min: Some(1990),
            year_max: Some(2010),
            ..Default::default()
        };
        let page = store().browse(&filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_count, 3);
        for movie in &page.movies {
            let year = movie.year.unwrap();
            assert!((1990..=2010).contains(&year));
        }
    }

    #[tokio::test]
    async fn test_browse_genre_filter_tags_every_result() {
        let filter = BrowseFilter {
            genre_id: Some(1),
            ..Default::default()
        };
        let page = store().browse(&filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.movies.len(), 3);
        for movie in &page.movies {
            assert!(movie.genres.contains(&"Animation".to_string()));
        }
        // full genre list is kept, not just the filtered genre
        let toy_story = page.movies.iter().find(|m| m.movie_id == 1).unwrap();
        assert_eq!(toy_story.genres, vec!["Animation", "Comedy"]);
    }

    #[tokio::test]
    async fn test_browse_orders_by_average_then_count() {
        let page = store()
            .browse(&BrowseFilter::default(), PageRequest::default())
            .await
            .unwrap();
        let ids: Vec<i32> = page.movies.iter().map(|m| m.movie_id).collect();
        // Matrix 4.5 (3), Toy Story 4.5 (2), WALL-E 3.0, Casablanca 2.0, then unrated by id
        assert_eq!(ids, vec![2, 1, 4, 5, 3, 6]);
        assert_eq!(page.movies[0].avg_rating, 4.5);
        assert_eq!(page.movies[0].rating_count, 3);
        assert_eq!(page.movies[4].avg_rating, 0.0);
    }

    #[tokio::test]
    async fn test_browse_orders_by_unrounded_average() {
        let mut seed = sample_seed();
        seed.ratings.clear();
        for user_id in 1..=2 {
            seed.ratings.push(SeedRating {
                user_id,
                movie_id: 1,
                rating: 4.5,
                rated_at: None,
            });
        }
        // 4.4975 rounds to 4.5 but must still sort below a true 4.5
        for user_id in 1..=200 {
            seed.ratings.push(SeedRating {
                user_id,
                movie_id: 2,
                rating: if user_id == 200 { 4.0 } else { 4.5 },
                rated_at: None,
            });
        }
        let page = MemoryStore::from_seed(seed)
            .unwrap()
            .browse(&BrowseFilter::default(), PageRequest::default())
            .await
            .unwrap();
        let top: Vec<(i32, f64, i64)> = page
            .movies
            .iter()
            .take(2)
            .map(|m| (m.movie_id, m.avg_rating, m.rating_count))
            .collect();
        assert_eq!(top, vec![(1, 4.5, 2), (2, 4.5, 200)]);
    }

    #[test]
    fn test_duplicate_seed_rating_rejected() {
        let mut seed = sample_seed();
        seed.ratings.push(SeedRating {
            user_id: 1,
            movie_id: 1,
            rating: 2.5,
            rated_at: None,
        });
        let err = MemoryStore::from_seed(seed).err().unwrap();
        assert_eq!(err.to_string(), "duplicate rating for user 1 and movie 1");
    }

    #[tokio::test]
    async fn test_browse_pagination_slices_after_sorting() {
        let page = PageRequest::new(Some(1), Some(2)).unwrap();
        let result = store().browse(&BrowseFilter::default(), page).await.unwrap();
        let ids: Vec<i32> = result.movies.iter().map(|m| m.movie_id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(result.total_count, 6);
        assert_eq!(result.total_pages, 3);
    }

    #[tokio::test]
    async fn test_browse_total_count_ignores_rating_floor() {
        let filter = BrowseFilter {
            rating_min: Some(4.0),
            ..Default::default()
        };
        let page = store().browse(&filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.movies.len(), 2);
        assert!(page.movies.iter().all(|m| m.avg_rating >= 4.0));
        // the count query does not apply the floor
        assert_eq!(page.total_count, 6);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn test_movie_details_found() {
        let details = store().movie_details(1).await.unwrap().unwrap();
        assert_eq!(details.title, "Toy Story");
        assert_eq!(details.avg_rating, 4.5);
        assert_eq!(details.rating_count, 2);
        assert_eq!(details.genres, vec!["Animation", "Comedy"]);
        assert_eq!(
            details.imdb_url.as_deref(),
            Some("https://www.imdb.com/title/tt0114709/")
        );
    }

    #[tokio::test]
    async fn test_movie_details_missing() {
        assert!(store().movie_details(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates_preserving_id() {
        let store = store();
        let rating = RatingValue::new(3.5).unwrap();

        let created = store.upsert_rating(3, 3, rating).await.unwrap();
        assert_eq!(created.action, RatingAction::Created);
        assert_eq!(created.rating_id, 8);

        let updated = store
            .upsert_rating(3, 3, RatingValue::new(5.0).unwrap())
            .await
            .unwrap();
        assert_eq!(updated.action, RatingAction::Updated);
        assert_eq!(updated.rating_id, created.rating_id);
        assert_eq!(updated.rating, 5.0);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.rating_count, 8);
    }

    #[tokio::test]
    async fn test_upsert_existing_seed_rating_is_update() {
        let outcome = store()
            .upsert_rating(1, 1, RatingValue::new(1.0).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.action, RatingAction::Updated);
        assert_eq!(outcome.rating_id, 1);
    }

    #[tokio::test]
    async fn test_upsert_unknown_movie_or_user() {
        let store = store();
        let rating = RatingValue::new(4.0).unwrap();
        assert!(matches!(
            store.upsert_rating(1, 999, rating).await,
            Err(StoreError::Missing { entity: "movie", id: 999 })
        ));
        assert!(matches!(
            store.upsert_rating(999, 1, rating).await,
            Err(StoreError::Missing { entity: "user", id: 999 })
        ));
    }

    #[tokio::test]
    async fn test_analytics_aggregations() {
        let report = store().analytics().await.unwrap();

        // nothing reaches the sample-size floor
        assert!(report.top_movies.is_empty());

        assert_eq!(report.genre_distribution[0].genre, "Animation");
        assert_eq!(report.genre_distribution[0].count, 3);

        let years: Vec<(i32, i64)> = report
            .ratings_by_year
            .iter()
            .map(|y| (y.year, y.count))
            .collect();
        assert_eq!(years, vec![(2015, 1), (2016, 2), (2017, 2), (2018, 2)]);

        let sci_fi = report
            .avg_rating_by_genre
            .iter()
            .find(|g| g.genre == "Sci-Fi")
            .unwrap();
        assert_eq!(sci_fi.rating_count, 4);
        assert_eq!(sci_fi.avg_rating, 4.13);
        for pair in report.avg_rating_by_genre.windows(2) {
            assert!(pair[0].avg_rating >= pair[1].avg_rating);
        }

        let decades: Vec<&str> = report
            .movies_by_decade
            .iter()
            .map(|d| d.decade.as_str())
            .collect();
        assert_eq!(decades, vec!["1940s", "1990s", "2000s", "2020s"]);
    }

    #[tokio::test]
    async fn test_bundled_seed_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("seed/sample_catalog.json");
        let store = MemoryStore::from_seed_file(&path).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.movie_count, 5);
        assert_eq!(stats.rating_count, 9);
        assert_eq!(stats.user_count, 4);
        assert_eq!(stats.genre_count, 7);

        // the null timestamp is skipped by the yearly aggregation
        let report = store.analytics().await.unwrap();
        let yearly: i64 = report.ratings_by_year.iter().map(|y| y.count).sum();
        assert_eq!(yearly, 8);
    }

    #[tokio::test]
    async fn test_invalid_seed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{ not json").unwrap();
        let err = MemoryStore::from_seed_file(file.path()).await.err().unwrap();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_top_movies_require_minimum_sample() {
        let mut seed = sample_seed();
        seed.users = (1..=60).collect();
        for user_id in 1..=TOP_MOVIES_MIN_RATINGS as i32 {
            seed.ratings.push(SeedRating {
                user_id: 100 + user_id,
                movie_id: 3,
                rating: 4.5,
                rated_at: None,
            });
        }
        let report = MemoryStore::from_seed(seed).unwrap().analytics().await.unwrap();
        assert_eq!(report.top_movies.len(), 1);
        assert_eq!(report.top_movies[0].title, "Robot Dreams");
        assert_eq!(report.top_movies[0].rating_count, TOP_MOVIES_MIN_RATINGS);
        assert_eq!(report.top_movies[0].avg_rating, 4.5);
    }
}
