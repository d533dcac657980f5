use data_loader::{MovieId, Rating, Score, UserId};
use predictor::{Neighbour, pearson, predict_rating, similarity, weighted_average};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Build a history with at most one rating per movie
fn history(user_id: UserId, scores: &BTreeMap<MovieId, Score>) -> Vec<Rating> {
    scores
        .iter()
        .enumerate()
        .map(|(i, (&movie_id, &score))| Rating {
            id: user_id * 1000 + i as u32,
            user_id,
            movie_id,
            score,
        })
        .collect()
}

fn scores_strategy(
    movies: std::ops::Range<MovieId>,
) -> impl Strategy<Value = BTreeMap<MovieId, Score>> {
    prop::collection::btree_map(movies, 1u8..=5, 0..20)
}

/// At least two distinct scores, so the side has non-zero variance
fn varied_scores() -> impl Strategy<Value = Vec<Score>> {
    prop::collection::vec(1u8..=5, 2..20)
        .prop_filter("needs variance", |v| v.iter().any(|&s| s != v[0]))
}

proptest! {
    #[test]
    fn disjoint_histories_are_uncorrelated(
        a in scores_strategy(0..50),
        b in scores_strategy(50..100),
    ) {
        let sim = similarity(&history(1, &a), &history(2, &b));
        prop_assert_eq!(sim, 0.0);
    }

    #[test]
    fn constant_side_is_uncorrelated(
        other in varied_scores(),
        constant in 1u8..=5,
    ) {
        let a: BTreeMap<MovieId, Score> =
            (0..other.len() as MovieId).map(|m| (m, constant)).collect();
        let b: BTreeMap<MovieId, Score> =
            other.iter().enumerate().map(|(m, &s)| (m as MovieId, s)).collect();

        prop_assert_eq!(similarity(&history(1, &a), &history(2, &b)), 0.0);
        prop_assert_eq!(similarity(&history(2, &b), &history(1, &a)), 0.0);
    }

    #[test]
    fn similarity_is_symmetric(
        a in scores_strategy(0..30),
        b in scores_strategy(0..30),
    ) {
        let ha = history(1, &a);
        let hb = history(2, &b);
        let ab = similarity(&ha, &hb);
        let ba = similarity(&hb, &ha);
        prop_assert!((ab - ba).abs() < 1e-9, "{} != {}", ab, ba);
    }

    #[test]
    fn similarity_is_roughly_bounded(
        a in scores_strategy(0..30),
        b in scores_strategy(0..30),
    ) {
        let sim = similarity(&history(1, &a), &history(2, &b));
        prop_assert!(sim.is_finite());
        prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&sim));
    }

    #[test]
    fn identical_scores_correlate_perfectly(scores in varied_scores()) {
        let map: BTreeMap<MovieId, Score> =
            scores.iter().enumerate().map(|(m, &s)| (m as MovieId, s)).collect();

        let sim = similarity(&history(1, &map), &history(2, &map));
        prop_assert!((sim - 1.0).abs() < 1e-9, "got {}", sim);
    }

    #[test]
    fn mirrored_scores_correlate_inversely(scores in varied_scores()) {
        let a: BTreeMap<MovieId, Score> =
            scores.iter().enumerate().map(|(m, &s)| (m as MovieId, s)).collect();
        let b: BTreeMap<MovieId, Score> =
            scores.iter().enumerate().map(|(m, &s)| (m as MovieId, 6 - s)).collect();

        let sim = similarity(&history(1, &a), &history(2, &b));
        prop_assert!((sim + 1.0).abs() < 1e-9, "got {}", sim);
    }

    #[test]
    fn pearson_ignores_pair_order(
        pairs in prop::collection::vec((1u8..=5, 1u8..=5), 0..20),
    ) {
        let forward: Vec<(f64, f64)> =
            pairs.iter().map(|&(a, b)| (f64::from(a), f64::from(b))).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        prop_assert!((pearson(&forward) - pearson(&reversed)).abs() < 1e-9);
    }

    #[test]
    fn weighted_average_ignores_uniform_scaling(
        raw in prop::collection::vec((1u8..=5, 0.01f64..1.0), 1..20),
        factor in 0.01f64..100.0,
    ) {
        let neighbours: Vec<Neighbour> = raw
            .iter()
            .enumerate()
            .map(|(i, &(score, similarity))| Neighbour {
                user_id: i as UserId,
                score,
                similarity,
            })
            .collect();
        let scaled: Vec<Neighbour> = neighbours
            .iter()
            .map(|n| Neighbour {
                similarity: n.similarity * factor,
                ..*n
            })
            .collect();

        let base = weighted_average(&neighbours).unwrap();
        let rescaled = weighted_average(&scaled).unwrap();
        prop_assert!((base - rescaled).abs() < 1e-9, "{} vs {}", base, rescaled);

        // A weighted mean stays within the scores it averages
        prop_assert!((1.0 - 1e-9..=5.0 + 1e-9).contains(&base));
    }

    #[test]
    fn prediction_without_co_raters_is_none(target in scores_strategy(0..30)) {
        let history = history(1, &target);
        let none: Vec<(&Rating, &[Rating])> = Vec::new();
        prop_assert_eq!(predict_rating(1, &history, none), None);
    }
}
