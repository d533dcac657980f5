//! Similarity Engine - Pearson correlation between two rating histories
//!
//! Two users are compared only on the movies both of them rated. Each shared
//! movie yields one paired observation `(score_a, score_b)` and the Pearson
//! coefficient of those pairs is the users' taste similarity.
//!
//! ## Degenerate cases
//! - No shared movies: `0.0`
//! - Either side has zero variance over the shared movies (including a single
//!   shared movie): `0.0`
//!
//! Neither is an error; both mean "no usable signal".

use data_loader::{MovieId, Rating, Score};
use std::collections::HashMap;

/// Scores of two users on the movies both rated.
///
/// The first element of each pair comes from `a`, the second from `b`. Pairs
/// follow the order of `b`.
pub fn paired_scores(a: &[Rating], b: &[Rating]) -> Vec<(f64, f64)> {
    let lookup: HashMap<MovieId, Score> = a.iter().map(|r| (r.movie_id, r.score)).collect();

    b.iter()
        .filter_map(|rating| {
            lookup
                .get(&rating.movie_id)
                .map(|&score_a| (f64::from(score_a), f64::from(rating.score)))
        })
        .collect()
}

/// Pearson correlation coefficient of a set of paired observations.
///
/// Returns `0.0` for an empty set or when either side has zero variance.
/// Rounding can push the result marginally outside `[-1.0, 1.0]`.
pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let (sum_a, sum_b, sum_a2, sum_b2, sum_ab) = pairs.iter().fold(
        (0.0, 0.0, 0.0, 0.0, 0.0),
        |(sa, sb, sa2, sb2, sab), &(a, b)| {
            (sa + a, sb + b, sa2 + a * a, sb2 + b * b, sab + a * b)
        },
    );

    let numerator = sum_ab - (sum_a * sum_b / n);
    let denominator = ((sum_a2 - sum_a * sum_a / n) * (sum_b2 - sum_b * sum_b / n)).sqrt();

    // Zero variance on either side, or a NaN from a negative rounding residue
    if denominator == 0.0 || denominator.is_nan() {
        return 0.0;
    }

    numerator / denominator
}

/// Taste similarity between two users' complete rating histories.
pub fn similarity(a: &[Rating], b: &[Rating]) -> f64 {
    pearson(&paired_scores(a, b))
}
