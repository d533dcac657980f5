//! # Predictor Crate
//!
//! Collaborative-filtering rating prediction for the ratings site.
//!
//! ## Components
//!
//! ### Similarity Engine
//! Pearson correlation between two users' rating histories, computed over the
//! movies both users rated. Pure function, no store access.
//!
//! ### Predictor
//! For a target user and movie, scores every other rater of the movie by
//! similarity to the target and averages the positively correlated raters'
//! scores, weighted by similarity.
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use predictor::Predictor;
//! use std::sync::Arc;
//!
//! let index = Arc::new(DataIndex::load_from_files(Path::new("data/ml-100k"))?);
//! let predictor = Predictor::new(index.clone());
//!
//! match predictor.predict_rating(1, 1682) {
//!     Some(score) => println!("Predicted score: {:.2}", score),
//!     None => println!("Not enough similar users to predict"),
//! }
//! ```
//!
//! The store is only read, so one `Predictor` (or its clones) can serve
//! concurrent requests from any number of threads.

// Public modules
pub mod prediction;
pub mod similarity;

// Re-export commonly used items
pub use prediction::{Neighbour, Prediction, Predictor, predict_rating, weighted_average};
pub use similarity::{paired_scores, pearson, similarity};
