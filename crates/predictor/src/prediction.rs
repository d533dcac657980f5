//! Predictor - k-nearest-neighbour rating prediction
//!
//! Predicts the score a user would give a movie they have not rated yet:
//! "Users whose taste correlates with yours gave it this, on average"
//!
//! ## Algorithm
//! 1. Take every existing rating on the target movie
//! 2. Score each rater by Pearson similarity to the target user
//!    (the target's own rating, if any, is skipped)
//! 3. Sort raters by similarity, most similar first
//! 4. Keep only strictly positive similarities
//! 5. Prediction = Σ(score × similarity) / Σ(similarity)
//!
//! An empty neighbour set means "no prediction", not zero. The result is not
//! clamped to the score range; display code may round or clamp it.

use crate::similarity::similarity;
use data_loader::{MovieId, Rating, RatingStore, Score, UserId};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A co-rater of the target movie together with their similarity to the
/// target user
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbour {
    pub user_id: UserId,
    /// The neighbour's score for the target movie
    pub score: Score,
    pub similarity: f64,
}

/// A predicted score and the neighbours it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub score: f64,
    /// Neighbours that contributed, most similar first
    pub neighbours: Vec<Neighbour>,
}

/// Predict a score from explicit inputs.
///
/// `co_raters` pairs every existing rating of the target movie with its
/// owner's full history. Ratings by `target_user` are ignored.
///
/// Returns `None` when no co-rater correlates positively with the target.
pub fn predict_rating<'a, I>(
    target_user: UserId,
    target_history: &[Rating],
    co_raters: I,
) -> Option<f64>
where
    I: IntoIterator<Item = (&'a Rating, &'a [Rating])>,
{
    let co_raters: Vec<(&Rating, &[Rating])> = co_raters.into_iter().collect();
    let scored = score_co_raters(target_user, target_history, &co_raters);
    let neighbours = select_neighbours(scored, 0.0, None);
    weighted_average(&neighbours)
}

/// Similarity-weighted mean of the neighbours' scores.
///
/// `None` for an empty set or when the weights do not sum to a positive value.
pub fn weighted_average(neighbours: &[Neighbour]) -> Option<f64> {
    let (weighted_sum, total_weight) = neighbours.iter().fold((0.0, 0.0), |(ws, tw), n| {
        (ws + f64::from(n.score) * n.similarity, tw + n.similarity)
    });

    if total_weight > 0.0 {
        Some(weighted_sum / total_weight)
    } else {
        None
    }
}

/// Compute each co-rater's similarity to the target user, in input order
fn score_co_raters(
    target_user: UserId,
    target_history: &[Rating],
    co_raters: &[(&Rating, &[Rating])],
) -> Vec<Neighbour> {
    co_raters
        .par_iter()
        .filter(|(rating, _)| rating.user_id != target_user)
        .map(|&(rating, history)| Neighbour {
            user_id: rating.user_id,
            score: rating.score,
            similarity: similarity(target_history, history),
        })
        .collect()
}

/// Rank by similarity, drop non-positive correlations, optionally keep top-k.
///
/// The sort is stable, so equal similarities keep the store's rating order.
fn select_neighbours(
    mut scored: Vec<Neighbour>,
    min_similarity: f64,
    max_neighbours: Option<usize>,
) -> Vec<Neighbour> {
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.retain(|n| n.similarity > min_similarity);
    if let Some(k) = max_neighbours {
        scored.truncate(k);
    }
    scored
}

/// Stateless prediction service over a shared rating store
pub struct Predictor<S: RatingStore> {
    /// Shared reference to the store (read-only, so no Mutex needed)
    store: Arc<S>,

    /// Neighbours must correlate strictly above this value
    min_similarity: f64,

    /// Use only the k most similar neighbours, all when `None`
    max_neighbours: Option<usize>,
}

// Manual impl: cloning shares the store, so `S` itself need not be Clone
impl<S: RatingStore> Clone for Predictor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            min_similarity: self.min_similarity,
            max_neighbours: self.max_neighbours,
        }
    }
}

impl<S: RatingStore> Predictor<S> {
    /// Create a new Predictor using every positively correlated neighbour
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            min_similarity: 0.0,
            max_neighbours: None,
        }
    }

    /// Configure the similarity threshold (default: 0.0, exclusive).
    ///
    /// Negative values are raised to 0.0; anti-correlated users never vote.
    pub fn with_min_similarity(mut self, threshold: f64) -> Self {
        self.min_similarity = threshold.max(0.0);
        self
    }

    /// Configure how many of the most similar neighbours to use (default: all)
    pub fn with_max_neighbours(mut self, k: usize) -> Self {
        self.max_neighbours = Some(k);
        self
    }

    /// Access the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Similarity between two users' full histories
    #[instrument(skip(self))]
    pub fn similarity_between(&self, a: UserId, b: UserId) -> f64 {
        similarity(self.store.ratings_by_user(a), self.store.ratings_by_user(b))
    }

    /// Predict the score `user_id` would give `movie_id`
    pub fn predict_rating(&self, user_id: UserId, movie_id: MovieId) -> Option<f64> {
        self.predict_with_details(user_id, movie_id)
            .map(|prediction| prediction.score)
    }

    /// Predict a score and report the neighbours behind it
    #[instrument(skip(self))]
    pub fn predict_with_details(
        &self,
        user_id: UserId,
        movie_id: MovieId,
    ) -> Option<Prediction> {
        let target_history = self.store.ratings_by_user(user_id);
        let co_raters: Vec<(&Rating, &[Rating])> = self
            .store
            .ratings_by_movie(movie_id)
            .iter()
            .map(|rating| (rating, self.store.ratings_by_user(rating.user_id)))
            .collect();

        debug!(
            "Scoring {} co-raters against {} ratings of user {}",
            co_raters.len(),
            target_history.len(),
            user_id
        );

        let scored = score_co_raters(user_id, target_history, &co_raters);
        let neighbours = select_neighbours(scored, self.min_similarity, self.max_neighbours);
        debug!("Kept {} positively correlated neighbours", neighbours.len());

        let score = weighted_average(&neighbours)?;
        Some(Prediction {
            user_id,
            movie_id,
            score,
            neighbours,
        })
    }
}
