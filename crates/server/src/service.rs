//! # Ratings Service
//!
//! This module answers the questions the ratings pages ask:
//! 1. Who are the users, and what has each of them rated?
//! 2. What are the movies, and how has each of them been rated?
//! 3. What would this viewer probably score this movie?
//! 4. Which unseen movies is this viewer predicted to like most?
//!
//! Everything reads one shared `Arc<DataIndex>`. CPU-bound batch work runs on
//! the blocking pool via `spawn_blocking` so async callers stay responsive.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use data_loader::{DataIndex, Movie, MovieId, Score, User, UserId};
use predictor::{Prediction, Predictor};

/// One line of a user's rating history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedMovie {
    pub movie_id: MovieId,
    pub title: String,
    pub score: Score,
}

/// A user's profile and rating history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub age: Option<u8>,
    pub zipcode: Option<String>,
    /// Ratings in the order they were made
    pub ratings: Vec<RatedMovie>,
    pub avg_score: Option<f64>,
}

/// One score a movie received
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReceivedScore {
    pub user_id: UserId,
    pub score: Score,
}

/// A movie's details, its scores and, for a viewer, their own score or a
/// prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieSummary {
    pub movie_id: MovieId,
    pub title: String,
    pub released_at: Option<NaiveDate>,
    pub imdb_url: Option<String>,
    /// Scores in the order they were made
    pub ratings: Vec<ReceivedScore>,
    /// `None` when nobody has rated the movie yet
    pub avg_score: Option<f64>,
    pub viewer_id: Option<UserId>,
    pub viewer_score: Option<Score>,
    /// Only computed when the viewer has not rated the movie
    pub prediction: Option<Prediction>,
}

/// A movie the user has not rated, ranked by predicted score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieRecommendation {
    pub movie_id: MovieId,
    pub title: String,
    pub released_at: Option<NaiveDate>,
    pub predicted_score: f64,
    pub neighbour_count: usize,
    pub explanation: String,
}

/// Read-side service over the ratings data
#[derive(Clone)]
pub struct RatingsService {
    data_index: Arc<DataIndex>,
    predictor: Predictor<DataIndex>,
}

impl RatingsService {
    /// Create a service predicting from every positively correlated user
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        let predictor = Predictor::new(data_index.clone());
        Self {
            data_index,
            predictor,
        }
    }

    /// Limit predictions to the k most similar users
    pub fn with_max_neighbours(mut self, k: usize) -> Self {
        self.predictor = self.predictor.with_max_neighbours(k);
        self
    }

    /// All users ordered by id
    pub fn list_users(&self) -> Vec<&User> {
        self.data_index
            .get_all_user_ids()
            .into_iter()
            .filter_map(|id| self.data_index.get_user(id))
            .collect()
    }

    /// All movies ordered by title
    pub fn list_movies(&self) -> Vec<&Movie> {
        let mut movies: Vec<&Movie> = self
            .data_index
            .get_all_movie_ids()
            .into_iter()
            .filter_map(|id| self.data_index.get_movie(id))
            .collect();
        movies.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        movies
    }

    /// Profile and rating history of one user
    pub fn user_summary(&self, user_id: UserId) -> Result<UserSummary> {
        let user = self.find_user(user_id)?;
        let ratings = self.data_index.get_user_ratings(user_id);

        let rated: Vec<RatedMovie> = ratings
            .iter()
            .filter_map(|rating| {
                let movie = self.data_index.get_movie(rating.movie_id)?;
                Some(RatedMovie {
                    movie_id: rating.movie_id,
                    title: movie.title.clone(),
                    score: rating.score,
                })
            })
            .collect();

        Ok(UserSummary {
            user_id,
            age: user.age,
            zipcode: user.zipcode.clone(),
            avg_score: mean(rated.iter().map(|r| r.score)),
            ratings: rated,
        })
    }

    /// Details and scores of one movie, optionally from a viewer's point of view
    pub fn movie_summary(
        &self,
        movie_id: MovieId,
        viewer: Option<UserId>,
    ) -> Result<MovieSummary> {
        let movie = self.find_movie(movie_id)?;
        if let Some(viewer_id) = viewer {
            self.find_user(viewer_id)?;
        }

        let ratings: Vec<ReceivedScore> = self
            .data_index
            .get_movie_ratings(movie_id)
            .iter()
            .map(|r| ReceivedScore {
                user_id: r.user_id,
                score: r.score,
            })
            .collect();

        let avg_score = self
            .data_index
            .get_movie_stats(movie_id)
            .map(|stats| stats.avg_score);

        let viewer_score = viewer
            .and_then(|viewer_id| self.data_index.get_rating(viewer_id, movie_id))
            .map(|r| r.score);

        // A viewer who already scored the movie gets their score, not a guess
        let prediction = match (viewer, viewer_score) {
            (Some(viewer_id), None) => self.predictor.predict_with_details(viewer_id, movie_id),
            _ => None,
        };

        Ok(MovieSummary {
            movie_id,
            title: movie.title.clone(),
            released_at: movie.released_at,
            imdb_url: movie.imdb_url.clone(),
            ratings,
            avg_score,
            viewer_id: viewer,
            viewer_score,
            prediction,
        })
    }

    /// Predict one user's score for one movie.
    ///
    /// `Ok(None)` means no positively correlated user has rated the movie.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Result<Option<Prediction>> {
        self.find_user(user_id)?;
        self.find_movie(movie_id)?;
        Ok(self.predictor.predict_with_details(user_id, movie_id))
    }

    /// Similarity between two users' tastes
    pub fn similarity(&self, a: UserId, b: UserId) -> Result<f64> {
        self.find_user(a)?;
        self.find_user(b)?;
        Ok(self.predictor.similarity_between(a, b))
    }

    /// Top `limit` unrated movies for a user by predicted score
    pub async fn recommend(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<MovieRecommendation>> {
        self.find_user(user_id)?;

        let start_time = Instant::now();
        let service = self.clone();
        let recommendations =
            tokio::task::spawn_blocking(move || service.rank_unrated_movies(user_id, limit))
                .await
                .context("Recommendation task panicked")?;

        info!(
            "Selected {} recommendations for user {} in {:.2?}",
            recommendations.len(),
            user_id,
            start_time.elapsed()
        );
        Ok(recommendations)
    }

    /// Predict every movie the user has not rated and keep the best `limit`
    fn rank_unrated_movies(&self, user_id: UserId, limit: usize) -> Vec<MovieRecommendation> {
        let rated: HashSet<MovieId> = self
            .data_index
            .get_user_ratings(user_id)
            .iter()
            .map(|r| r.movie_id)
            .collect();

        let candidates: Vec<MovieId> = self
            .data_index
            .get_all_movie_ids()
            .into_iter()
            .filter(|id| {
                !rated.contains(id) && !self.data_index.get_movie_ratings(*id).is_empty()
            })
            .collect();
        debug!(
            "Predicting {} unrated movies for user {}",
            candidates.len(),
            user_id
        );

        let mut predictions: Vec<Prediction> = candidates
            .par_iter()
            .filter_map(|&movie_id| self.predictor.predict_with_details(user_id, movie_id))
            .collect();

        // Sort by predicted score DESC, movie id breaks ties
        predictions.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.movie_id.cmp(&b.movie_id))
        });
        predictions.truncate(limit);

        predictions
            .into_iter()
            .filter_map(|prediction| {
                let movie = self.data_index.get_movie(prediction.movie_id)?;
                Some(MovieRecommendation {
                    movie_id: prediction.movie_id,
                    title: movie.title.clone(),
                    released_at: movie.released_at,
                    predicted_score: prediction.score,
                    neighbour_count: prediction.neighbours.len(),
                    explanation: format!(
                        "Predicted {:.2} from {} similar users",
                        prediction.score,
                        prediction.neighbours.len()
                    ),
                })
            })
            .collect()
    }

    fn find_user(&self, user_id: UserId) -> Result<&User> {
        self.data_index
            .get_user(user_id)
            .ok_or_else(|| anyhow!("User {} not found", user_id))
    }

    fn find_movie(&self, movie_id: MovieId) -> Result<&Movie> {
        self.data_index
            .get_movie(movie_id)
            .ok_or_else(|| anyhow!("Movie {} not found", movie_id))
    }
}

/// Arithmetic mean of a set of scores, `None` when empty
fn mean(scores: impl Iterator<Item = Score>) -> Option<f64> {
    let (total, count) = scores.fold((0.0, 0u32), |(t, c), s| (t + f64::from(s), c + 1));
    if count == 0 {
        None
    } else {
        Some(total / f64::from(count))
    }
}
