//! # Data Loader Crate
//!
//! This crate loads and indexes the users, movies and ratings of the ratings
//! site, and exposes them through the read-only [`RatingStore`] view that the
//! prediction engine consumes.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (User, Movie, Rating, DataIndex, RatingStore)
//! - **parser**: Parse MovieLens-100k files into Rust structs
//! - **index**: Build indices, validate, apply score updates
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! let mut index = DataIndex::load_from_files(Path::new("data/ml-100k"))?;
//!
//! let movie = index.get_movie(1).unwrap();
//! let ratings = index.get_movie_ratings(1);
//! println!("{} has {} ratings", movie.title, ratings.len());
//!
//! // A user submits a score
//! index.upsert_rating(1, 1, 4)?;
//! ```

// Public modules
pub mod error;
pub mod index;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use types::{
    // Type aliases and constants
    MovieId,
    RatingId,
    Score,
    UserId,
    MAX_SCORE,
    MIN_SCORE,
    // Core types
    DataIndex,
    Movie,
    MovieStats,
    Rating,
    RatingStore,
    User,
    is_valid_score,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_index_creation() {
        let index = DataIndex::new();
        let (users, movies, ratings) = index.counts();

        assert_eq!(users, 0);
        assert_eq!(movies, 0);
        assert_eq!(ratings, 0);
    }

    #[test]
    fn test_insert_user() {
        let mut index = DataIndex::new();

        index.insert_user(User {
            id: 1,
            age: Some(24),
            zipcode: Some("85711".to_string()),
        });

        let retrieved = index.get_user(1).unwrap();
        assert_eq!(retrieved.id, 1);
        assert_eq!(retrieved.zipcode.as_deref(), Some("85711"));
    }

    #[test]
    fn test_insert_rating_updates_both_indices() {
        let mut index = DataIndex::new();

        index.insert_rating(Rating {
            id: 7,
            user_id: 1,
            movie_id: 242,
            score: 5,
        });

        let user_ratings = index.get_user_ratings(1);
        assert_eq!(user_ratings.len(), 1);
        assert_eq!(user_ratings[0].score, 5);

        let movie_ratings = index.get_movie_ratings(242);
        assert_eq!(movie_ratings.len(), 1);

        // Store view sees the same slices
        assert_eq!(index.ratings_by_user(1), user_ratings);
        assert_eq!(index.ratings_by_movie(242), movie_ratings);

        // Next id continues after the highest inserted one
        assert_eq!(index.next_rating_id, 8);
    }

    #[test]
    fn test_empty_queries() {
        let index = DataIndex::new();

        assert!(index.get_user(999).is_none());
        assert!(index.get_movie(999).is_none());
        assert!(index.get_user_ratings(999).is_empty());
        assert!(index.get_movie_ratings(999).is_empty());
        assert!(index.get_rating(999, 999).is_none());
        assert!(index.get_movie_stats(999).is_none());
    }

    #[test]
    fn test_score_range() {
        assert!(!is_valid_score(0));
        assert!(is_valid_score(MIN_SCORE));
        assert!(is_valid_score(MAX_SCORE));
        assert!(!is_valid_score(MAX_SCORE + 1));
    }
}
