use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{DataIndex, MAX_SCORE, MIN_SCORE, MovieId, Score, UserId};
use server::{MovieRecommendation, MovieSummary, RatingsService, UserSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::info;

/// Ratings - predict how users will score movies they have not seen
#[derive(Parser)]
#[command(name = "ratings")]
#[command(about = "Movie ratings with Pearson-correlation score prediction", long_about = None)]
struct Cli {
    /// Path to MovieLens-100k dataset directory
    #[arg(short, long, global = true, default_value = "data/ml-100k")]
    data_dir: PathBuf,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all users
    Users,

    /// Show a user's profile and rating history
    User {
        #[arg(long)]
        user_id: UserId,
    },

    /// List all movies by title
    Movies,

    /// Show a movie's ratings, optionally from one user's point of view
    Movie {
        #[arg(long)]
        movie_id: MovieId,

        /// Show this user's score, or a prediction if they have not rated it
        #[arg(long)]
        as_user: Option<UserId>,
    },

    /// Predict a user's score for a movie
    Predict {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        movie_id: MovieId,

        /// List the neighbours the prediction was built from
        #[arg(long)]
        explain: bool,

        /// Only use the k most similar users
        #[arg(long)]
        max_neighbours: Option<usize>,
    },

    /// Recommend unrated movies by predicted score
    Recommend {
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations to return
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Record a user's score for a movie and show the updated movie
    Rate {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        movie_id: MovieId,

        /// Score between 1 and 5
        #[arg(long)]
        score: Score,
    },

    /// Run benchmark to test recommendation performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_index = load_dataset(&cli.data_dir)?;

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Users => handle_users(&build_service(data_index), cli.json)?,
        Commands::User { user_id } => {
            handle_user(&build_service(data_index), user_id, cli.json)?
        }
        Commands::Movies => handle_movies(&build_service(data_index), cli.json)?,
        Commands::Movie { movie_id, as_user } => {
            handle_movie(&build_service(data_index), movie_id, as_user, cli.json)?
        }
        Commands::Predict {
            user_id,
            movie_id,
            explain,
            max_neighbours,
        } => {
            let service = build_service(data_index);
            let service = match max_neighbours {
                Some(k) => service.with_max_neighbours(k),
                None => service,
            };
            handle_predict(&service, user_id, movie_id, explain, cli.json)?
        }
        Commands::Recommend { user_id, limit } => {
            handle_recommend(&build_service(data_index), user_id, limit, cli.json).await?
        }
        Commands::Rate {
            user_id,
            movie_id,
            score,
        } => handle_rate(data_index, &cli.data_dir, user_id, movie_id, score, cli.json)?,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(build_service(data_index), requests, concurrent).await?,
    }

    Ok(())
}

fn load_dataset(data_dir: &Path) -> Result<DataIndex> {
    eprintln!("Loading MovieLens dataset from {}...", data_dir.display());
    let start = Instant::now();
    let data_index =
        DataIndex::load_from_files(data_dir).context("Failed to load MovieLens dataset")?;
    eprintln!("{} Loaded dataset in {:?}", "✓".green(), start.elapsed());
    Ok(data_index)
}

/// Share the loaded index with a read-only service
fn build_service(data_index: DataIndex) -> RatingsService {
    RatingsService::new(Arc::new(data_index))
}

/// Handle the 'users' command
fn handle_users(service: &RatingsService, json: bool) -> Result<()> {
    let users = service.list_users();
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    println!("{}", format!("{} users", users.len()).bold().blue());
    for user in users {
        println!(
            "{:>5}  age {:<4} zip {}",
            user.id.to_string().green(),
            display_or_dash(user.age),
            user.zipcode.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Handle the 'user' command
fn handle_user(service: &RatingsService, user_id: UserId, json: bool) -> Result<()> {
    let summary = service.user_summary(user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_user_summary(&summary);
    }
    Ok(())
}

/// Handle the 'movies' command
fn handle_movies(service: &RatingsService, json: bool) -> Result<()> {
    let movies = service.list_movies();
    if json {
        println!("{}", serde_json::to_string_pretty(&movies)?);
        return Ok(());
    }

    println!("{}", format!("{} movies", movies.len()).bold().blue());
    for movie in movies {
        println!("{:>5}  {}", movie.id.to_string().green(), movie.title);
    }
    Ok(())
}

/// Handle the 'movie' command
fn handle_movie(
    service: &RatingsService,
    movie_id: MovieId,
    viewer: Option<UserId>,
    json: bool,
) -> Result<()> {
    let summary = service.movie_summary(movie_id, viewer)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_movie_summary(&summary);
    }
    Ok(())
}

/// Handle the 'rate' command
///
/// The score is applied to the index, written to the dataset's u.data, and
/// the updated movie is shown from the rater's point of view.
fn handle_rate(
    mut data_index: DataIndex,
    data_dir: &Path,
    user_id: UserId,
    movie_id: MovieId,
    score: Score,
    json: bool,
) -> Result<()> {
    let rating_id = data_index
        .upsert_rating(user_id, movie_id, score)
        .with_context(|| format!("Failed to rate movie {} as user {}", movie_id, user_id))?;
    data_index
        .save_rating(data_dir, user_id, movie_id)
        .with_context(|| {
            format!(
                "Failed to save rating {} to {}",
                rating_id,
                data_dir.display()
            )
        })?;
    info!(
        "Stored rating {} ({} stars) for user {} on movie {}",
        rating_id, score, user_id, movie_id
    );

    handle_movie(&build_service(data_index), movie_id, Some(user_id), json)
}

/// Handle the 'predict' command
fn handle_predict(
    service: &RatingsService,
    user_id: UserId,
    movie_id: MovieId,
    explain: bool,
    json: bool,
) -> Result<()> {
    let prediction = service.predict(user_id, movie_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    let Some(prediction) = prediction else {
        println!(
            "No prediction for user {} on movie {}: no positively correlated users rated it",
            user_id, movie_id
        );
        return Ok(());
    };

    println!(
        "{} User {} would score movie {} about {}",
        "→".cyan(),
        user_id,
        movie_id,
        display_score(prediction.score).bold()
    );
    if explain {
        println!("Built from {} neighbours:", prediction.neighbours.len());
        for neighbour in &prediction.neighbours {
            println!(
                "  - user {:>4} scored {} (similarity {:.3})",
                neighbour.user_id, neighbour.score, neighbour.similarity
            );
        }
    }
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    service: &RatingsService,
    user_id: UserId,
    limit: usize,
    json: bool,
) -> Result<()> {
    let recommendations = service.recommend(user_id, limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
    } else {
        print_recommendations(&recommendations);
    }
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    service: RatingsService,
    requests: usize,
    concurrent: usize,
) -> Result<()> {
    if requests == 0 {
        bail!("Benchmark needs at least one request");
    }

    let all_users = service.list_users();
    if all_users.is_empty() {
        bail!("Dataset has no users to benchmark with");
    }
    let user_ids: Vec<UserId> = (0..requests)
        .map(|_| all_users[rand::random_range(0..all_users.len())].id)
        .collect();

    let permits = Arc::new(Semaphore::new(concurrent.max(1)));
    let wall_clock = Instant::now();

    let mut handles = Vec::with_capacity(requests);
    for user_id in user_ids {
        let service = service.clone();
        let permits = permits.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let start = Instant::now();
            service.recommend(user_id, 20).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings = Vec::with_capacity(requests);
    for handle in handles {
        timings.push(handle.await??);
    }
    let total_time = wall_clock.elapsed();

    timings.sort();
    let latency_sum: Duration = timings.iter().sum();
    let avg_latency = latency_sum / timings.len() as u32;
    let throughput = requests as f64 / total_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", requests, concurrent.max(1));
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(&timings, 0.50));
    println!("P95 latency: {:?}", percentile(&timings, 0.95));
    println!("P99 latency: {:?}", percentile(&timings, 0.99));
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}

/// Nearest-rank percentile of sorted timings
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = (sorted.len() as f64 * p) as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn print_user_summary(summary: &UserSummary) {
    println!("{}", format!("User ID: {}", summary.user_id).bold().blue());
    println!("{}Age: {}", "• ".green(), display_or_dash(summary.age));
    println!(
        "{}Zipcode: {}",
        "• ".green(),
        summary.zipcode.as_deref().unwrap_or("-")
    );
    println!("{}Number of ratings: {}", "• ".cyan(), summary.ratings.len());
    if let Some(avg) = summary.avg_score {
        println!("{}Average score: {:.2}", "• ".cyan(), avg);
    }

    println!("Ratings:");
    for rated in &summary.ratings {
        println!(
            "  - {} ({} stars) [movie {}]",
            rated.title, rated.score, rated.movie_id
        );
    }
}

fn print_movie_summary(summary: &MovieSummary) {
    println!("{}", summary.title.bold().blue());
    if let Some(released_at) = summary.released_at {
        println!("{}Released: {}", "• ".green(), released_at.format("%d %b %Y"));
    }
    if let Some(url) = &summary.imdb_url {
        println!("{}IMDb: {}", "• ".green(), url);
    }
    match summary.avg_score {
        Some(avg) => println!(
            "{}Average score: {:.2} ({} ratings)",
            "• ".cyan(),
            avg,
            summary.ratings.len()
        ),
        None => println!("{}No ratings yet", "• ".cyan()),
    }

    if let Some(viewer_id) = summary.viewer_id {
        match (summary.viewer_score, &summary.prediction) {
            (Some(score), _) => println!("User {} scored this {} stars", viewer_id, score),
            (None, Some(prediction)) => println!(
                "User {} would score this about {} (from {} similar users)",
                viewer_id,
                display_score(prediction.score),
                prediction.neighbours.len()
            ),
            (None, None) => println!("No prediction for user {}", viewer_id),
        }
    }

    println!("Scores:");
    for received in &summary.ratings {
        println!("  - user {:>4}: {}", received.user_id, received.score);
    }
}

fn print_recommendations(recommendations: &[MovieRecommendation]) {
    println!("{}", "Movie Recommendations:".bold().blue());
    if recommendations.is_empty() {
        println!("Nothing to recommend yet");
        return;
    }

    for (i, rec) in recommendations.iter().enumerate() {
        let year = rec
            .released_at
            .map(|date| date.format("%Y").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}. {} ({}) - Predicted: {}",
            (i + 1).to_string().green(),
            rec.title,
            year,
            display_score(rec.predicted_score)
        );
        println!("   {}", rec.explanation);
    }
}

/// Predictions are clamped to the score range and rounded only for display
fn display_score(score: f64) -> String {
    let clamped = score.clamp(f64::from(MIN_SCORE), f64::from(MAX_SCORE));
    format!("{:.1}", clamped)
}

fn display_or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_score_clamps() {
        assert_eq!(display_score(5.7), "5.0");
        assert_eq!(display_score(0.2), "1.0");
        assert_eq!(display_score(3.46), "3.5");
    }

    #[test]
    fn test_percentile() {
        let timings: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&timings, 0.50), Duration::from_millis(51));
        assert_eq!(percentile(&timings, 0.99), Duration::from_millis(100));
        assert_eq!(percentile(&timings[..1], 0.95), Duration::from_millis(1));
    }

    #[test]
    fn test_rate_is_visible_to_the_next_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("u.user"),
            "1|24|M|technician|85711\n2|53|F|other|94043\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("u.item"),
            "1|Toy Story (1995)|01-Jan-1995||http://example|0\n2|GoldenEye (1995)|01-Jan-1995||http://example|0\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("u.data"),
            "1\t1\t4\t881250949\n2\t1\t4\t881250950\n2\t2\t3\t891717742\n",
        )
        .unwrap();

        let data_index = load_dataset(dir.path()).unwrap();
        handle_rate(data_index, dir.path(), 1, 2, 1, true).unwrap();

        let service = build_service(load_dataset(dir.path()).unwrap());
        let summary = service.movie_summary(2, Some(1)).unwrap();
        assert_eq!(summary.viewer_score, Some(1));
        assert_eq!(summary.ratings.len(), 2);
        assert!((summary.avg_score.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(summary.prediction, None);
    }

    #[test]
    fn test_rate_rejects_out_of_range_score_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("u.user"), "1|24|M|technician|85711\n").unwrap();
        std::fs::write(
            dir.path().join("u.item"),
            "1|Toy Story (1995)|01-Jan-1995||http://example|0\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("u.data"), "1\t1\t4\t881250949\n").unwrap();

        let data_index = load_dataset(dir.path()).unwrap();
        assert!(handle_rate(data_index, dir.path(), 1, 1, 9, false).is_err());

        let content = std::fs::read_to_string(dir.path().join("u.data")).unwrap();
        assert_eq!(content, "1\t1\t4\t881250949\n");
    }

    #[test]
    fn test_cli_parses_rate_command() {
        let cli = Cli::try_parse_from([
            "ratings", "-d", "fixtures", "rate", "--user-id", "1", "--movie-id", "2", "--score",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("fixtures"));
        match cli.command {
            Commands::Rate {
                user_id,
                movie_id,
                score,
            } => assert_eq!((user_id, movie_id, score), (1, 2, 4)),
            _ => panic!("expected rate command"),
        }
    }

    #[test]
    fn test_cli_parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ratings", "movie", "--movie-id", "7", "--as-user", "3", "--json",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.data_dir, PathBuf::from("data/ml-100k"));
        match cli.command {
            Commands::Movie { movie_id, as_user } => {
                assert_eq!(movie_id, 7);
                assert_eq!(as_user, Some(3));
            }
            _ => panic!("expected movie command"),
        }
    }
}
