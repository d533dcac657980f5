//! Server crate for the ratings site.
//!
//! This crate contains the service that turns the data index and the
//! predictor into the per-user and per-movie views the site shows.

pub mod service;

pub use service::{
    MovieRecommendation, MovieSummary, RatedMovie, RatingsService, ReceivedScore, UserSummary,
};
