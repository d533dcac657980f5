//! Core domain types for the ratings dataset.
//!
//! This module defines the fundamental data structures used throughout the system.
//! Key Rust concepts demonstrated here:
//! - Type aliases for domain clarity (UserId, MovieId, Score)
//! - Structs with public fields
//! - A trait describing the read-only view the prediction engine needs
//! - HashMap for efficient lookups

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Type Aliases
// =============================================================================
// These make the domain clearer and prevent mixing up user IDs with movie IDs

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a movie
pub type MovieId = u32;

/// Unique identifier for a rating row, assigned in insertion order
pub type RatingId = u32;

/// Integer score a user gives a movie
pub type Score = u8;

/// Lowest score the store accepts
pub const MIN_SCORE: Score = 1;

/// Highest score the store accepts
pub const MAX_SCORE: Score = 5;

// =============================================================================
// Users and Movies
// =============================================================================

/// A registered user of the ratings site.
///
/// Only the profile fields the summaries display are kept; credentials live
/// with whatever layer handles login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub age: Option<u8>,
    pub zipcode: Option<String>,
}

/// A movie that can be rated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Theatrical release date, if the dataset knows it
    pub released_at: Option<NaiveDate>,
    pub imdb_url: Option<String>,
}

// =============================================================================
// Rating Type
// =============================================================================

/// One user's score for one movie.
///
/// Small and `Copy`: indices hand out `&[Rating]` slices and the prediction
/// engine only ever reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub score: Score,
}

/// Returns true if `score` lies within `MIN_SCORE..=MAX_SCORE`
pub fn is_valid_score(score: Score) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Precomputed statistics for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieStats {
    pub avg_score: f64,
    pub rating_count: u32,
}

// =============================================================================
// RatingStore - the read-only view used by the prediction engine
// =============================================================================

/// The two lookups collaborative filtering needs from storage.
///
/// Implementations must return each user's ratings with at most one entry
/// per movie, and each movie's ratings with at most one entry per user.
/// `Send + Sync` lets one store be shared across worker threads.
pub trait RatingStore: Send + Sync {
    /// All ratings made by a user, empty if the user is unknown
    fn ratings_by_user(&self, user_id: UserId) -> &[Rating];

    /// All ratings received by a movie, empty if the movie is unknown
    fn ratings_by_movie(&self, movie_id: MovieId) -> &[Rating];
}

// =============================================================================
// DataIndex - The Core In-Memory Database
// =============================================================================

/// Main data structure that holds all data and indices.
///
/// Rust concepts demonstrated:
/// - HashMap<K, V> for O(1) lookups
/// - Borrowing: methods return `&T` (references) not `T` (owned values)
#[derive(Debug)]
pub struct DataIndex {
    // Primary data stores
    pub(crate) users: HashMap<UserId, User>,
    pub(crate) movies: HashMap<MovieId, Movie>,

    // Rating indices, each kept in rating-id order
    /// All ratings made by each user
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each movie
    pub(crate) movie_ratings: HashMap<MovieId, Vec<Rating>>,

    // Precomputed statistics
    pub(crate) movie_stats: HashMap<MovieId, MovieStats>,

    /// Id handed to the next inserted rating
    pub(crate) next_rating_id: RatingId,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            movies: HashMap::new(),
            user_ratings: HashMap::new(),
            movie_ratings: HashMap::new(),
            movie_stats: HashMap::new(),
            next_rating_id: 1,
        }
    }

    /// Get a user by ID
    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all ratings for a movie
    pub fn get_movie_ratings(&self, movie_id: MovieId) -> &[Rating] {
        self.movie_ratings
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Find a user's rating for one movie
    pub fn get_rating(&self, user_id: UserId, movie_id: MovieId) -> Option<&Rating> {
        self.get_user_ratings(user_id)
            .iter()
            .find(|r| r.movie_id == movie_id)
    }

    /// Get precomputed statistics for a movie
    pub fn get_movie_stats(&self, movie_id: MovieId) -> Option<&MovieStats> {
        self.movie_stats.get(&movie_id)
    }

    /// All user IDs, ascending
    pub fn get_all_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All movie IDs, ascending
    pub fn get_all_movie_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.movies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // Mutators - used during loading and when a user submits a score.
    // They take `&mut self`, so a shared `Arc<DataIndex>` stays read-only.

    /// Insert a user into the index
    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Insert a movie into the index
    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    /// Insert a rating and update both rating indices.
    ///
    /// No duplicate check happens here; `validate` reports duplicates after a
    /// bulk load and `upsert_rating` is the checked path for single writes.
    pub fn insert_rating(&mut self, rating: Rating) {
        self.next_rating_id = self.next_rating_id.max(rating.id.saturating_add(1));

        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .push(rating);

        self.movie_ratings
            .entry(rating.movie_id)
            .or_default()
            .push(rating);
    }

    /// Get counts for debugging/validation
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|v| v.len()).sum();
        (self.users.len(), self.movies.len(), total_ratings)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RatingStore for DataIndex {
    fn ratings_by_user(&self, user_id: UserId) -> &[Rating] {
        self.get_user_ratings(user_id)
    }

    fn ratings_by_movie(&self, movie_id: MovieId) -> &[Rating] {
        self.get_movie_ratings(movie_id)
    }
}
