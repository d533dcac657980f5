use data_loader::DataIndex;
use std::path::Path;
use std::time::Instant;

fn main() -> data_loader::Result<()> {
    let data_dir = Path::new("data/ml-100k");

    println!("Loading ratings dataset...\n");

    let start = Instant::now();
    let index = DataIndex::load_from_files(data_dir)?;
    let elapsed = start.elapsed();

    let (users, movies, ratings) = index.counts();

    println!("=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Movies: {}", movies);
    println!("Ratings: {}", ratings);
    println!(
        "\nPerformance: {:.0} ratings/second",
        ratings as f64 / elapsed.as_secs_f64()
    );

    // Movie stats are what the movie pages show, so report their spread
    let stats: Vec<_> = index
        .get_all_movie_ids()
        .into_iter()
        .filter_map(|id| index.get_movie_stats(id).map(|s| (id, *s)))
        .collect();

    println!("\n=== Movie Stats ===");
    println!("Rated movies: {} of {}", stats.len(), movies);
    println!("Unrated movies: {}", movies - stats.len());

    if let Some((id, most_rated)) = stats.iter().max_by_key(|(_, s)| s.rating_count) {
        let title = index.get_movie(*id).map_or("?", |m| m.title.as_str());
        println!(
            "Most rated: {} ({} ratings, avg {:.2})",
            title, most_rated.rating_count, most_rated.avg_score
        );
    }

    let users_with_history = index
        .get_all_user_ids()
        .into_iter()
        .filter(|&id| !index.get_user_ratings(id).is_empty())
        .count();
    println!(
        "Average ratings per active user: {:.1}",
        ratings as f64 / users_with_history.max(1) as f64
    );

    Ok(())
}
