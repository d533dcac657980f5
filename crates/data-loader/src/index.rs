//! DataIndex building, validation and rating updates.
//!
//! This module builds the DataIndex from parsed data:
//! - Create primary indices (users, movies, ratings)
//! - Compute aggregate statistics (movie stats)
//! - Validate the invariants the prediction engine relies on
//! - Apply a single user's new or changed score

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

impl DataIndex {
    /// Load a MovieLens-100k style dataset from a directory
    ///
    /// Steps:
    /// 1. Parse all three files (u.user, u.item, u.data) in parallel
    /// 2. Build primary indices
    /// 3. Compute movie statistics
    /// 4. Validate data integrity
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        info!("Loading ratings dataset from {:?}", data_dir);

        let users_path = data_dir.join("u.user");
        let movies_path = data_dir.join("u.item");
        let ratings_path = data_dir.join("u.data");

        // Nested joins give three-way parallelism
        let ((users, movies), ratings) = rayon::join(
            || {
                rayon::join(
                    || parser::parse_users(&users_path),
                    || parser::parse_movies(&movies_path),
                )
            },
            || parser::parse_ratings(&ratings_path),
        );

        let users = users?;
        let movies = movies?;
        let ratings = ratings?;

        info!(
            "Loaded {} users, {} movies, {} ratings",
            users.len(),
            movies.len(),
            ratings.len()
        );

        let mut index = DataIndex::new();

        for user in users {
            index.insert_user(user);
        }

        for movie in movies {
            index.insert_movie(movie);
        }

        // Also populates user_ratings and movie_ratings
        for rating in ratings {
            index.insert_rating(rating);
        }

        index.compute_movie_stats();
        index.validate()?;

        info!("DataIndex successfully built and validated");
        Ok(index)
    }

    /// Compute average score and rating count for every rated movie
    pub fn compute_movie_stats(&mut self) {
        let movie_stats = self
            .movie_ratings
            .par_iter()
            .filter_map(|(&movie_id, ratings)| {
                compute_stats(ratings).map(|stats| (movie_id, stats))
            })
            .collect();
        self.movie_stats = movie_stats;
    }

    /// Validate data integrity
    ///
    /// Check that:
    /// - All rating.user_id references exist in users
    /// - All rating.movie_id references exist in movies
    /// - Scores are in the valid range (MIN_SCORE..=MAX_SCORE)
    /// - No user rated the same movie twice
    pub fn validate(&self) -> Result<()> {
        for (user_id, ratings) in &self.user_ratings {
            if !self.users.contains_key(user_id) {
                return Err(DataLoadError::MissingReference {
                    entity: "User".to_string(),
                    id: *user_id,
                });
            }

            let mut seen = HashSet::with_capacity(ratings.len());
            for rating in ratings {
                if !self.movies.contains_key(&rating.movie_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Movie".to_string(),
                        id: rating.movie_id,
                    });
                }
                if !is_valid_score(rating.score) {
                    return Err(invalid_score(rating.score));
                }
                if !seen.insert(rating.movie_id) {
                    return Err(DataLoadError::DuplicateRating {
                        user_id: rating.user_id,
                        movie_id: rating.movie_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Record a user's score for a movie.
    ///
    /// Changes the existing rating in place if the user already rated the
    /// movie, otherwise inserts a new rating with the next free id. Both
    /// rating indices and the movie's stats are updated.
    ///
    /// Returns the id of the stored rating.
    pub fn upsert_rating(
        &mut self,
        user_id: UserId,
        movie_id: MovieId,
        score: Score,
    ) -> Result<RatingId> {
        if !is_valid_score(score) {
            return Err(invalid_score(score));
        }
        if !self.users.contains_key(&user_id) {
            return Err(DataLoadError::MissingReference {
                entity: "User".to_string(),
                id: user_id,
            });
        }
        if !self.movies.contains_key(&movie_id) {
            return Err(DataLoadError::MissingReference {
                entity: "Movie".to_string(),
                id: movie_id,
            });
        }

        let existing = self
            .user_ratings
            .get_mut(&user_id)
            .and_then(|ratings| ratings.iter_mut().find(|r| r.movie_id == movie_id));

        let rating_id = match existing {
            Some(rating) => {
                debug!(
                    "Updating rating {} for user {} movie {}: {} -> {}",
                    rating.id, user_id, movie_id, rating.score, score
                );
                rating.score = score;
                let rating_id = rating.id;
                if let Some(by_movie) = self
                    .movie_ratings
                    .get_mut(&movie_id)
                    .and_then(|ratings| ratings.iter_mut().find(|r| r.id == rating_id))
                {
                    by_movie.score = score;
                }
                rating_id
            }
            None => {
                let rating = Rating {
                    id: self.next_rating_id,
                    user_id,
                    movie_id,
                    score,
                };
                debug!(
                    "Inserting rating {} for user {} movie {}: {}",
                    rating.id, user_id, movie_id, score
                );
                self.insert_rating(rating);
                rating.id
            }
        };

        self.refresh_movie_stats(movie_id);
        Ok(rating_id)
    }

    /// Save a user's stored rating of a movie to `u.data` under `data_dir`
    ///
    /// Call after `upsert_rating` so the next `load_from_files` sees the
    /// same score.
    pub fn save_rating(
        &self,
        data_dir: &Path,
        user_id: UserId,
        movie_id: MovieId,
    ) -> Result<()> {
        let rating = self
            .get_rating(user_id, movie_id)
            .ok_or_else(|| DataLoadError::MissingReference {
                entity: "Rating".to_string(),
                id: movie_id,
            })?;

        parser::write_rating(&data_dir.join("u.data"), rating)?;
        info!(
            "Saved rating {} for user {} movie {} to {:?}",
            rating.id, user_id, movie_id, data_dir
        );
        Ok(())
    }

    /// Recompute the stats of a single movie after its ratings changed
    fn refresh_movie_stats(&mut self, movie_id: MovieId) {
        match compute_stats(self.get_movie_ratings(movie_id)) {
            Some(stats) => {
                self.movie_stats.insert(movie_id, stats);
            }
            None => {
                self.movie_stats.remove(&movie_id);
            }
        }
    }
}

/// Average and count of a movie's ratings; `None` when it has none
fn compute_stats(ratings: &[Rating]) -> Option<MovieStats> {
    if ratings.is_empty() {
        return None;
    }
    let total: f64 = ratings.iter().map(|r| f64::from(r.score)).sum();
    Some(MovieStats {
        avg_score: total / ratings.len() as f64,
        rating_count: ratings.len() as u32,
    })
}

fn invalid_score(score: Score) -> DataLoadError {
    DataLoadError::InvalidValue {
        field: "score".to_string(),
        value: score.to_string(),
    }
}
