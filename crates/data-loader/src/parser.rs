//! Parser for MovieLens-100k style data files.
//!
//! This module handles parsing the three dataset files:
//! - u.user: userId|age|gender|occupation|zipcode
//! - u.item: movieId|title|releaseDate|videoReleaseDate|imdbUrl|genre flags...
//! - u.data: userId<TAB>movieId<TAB>score<TAB>timestamp
//!
//! Ratings are the only data written back: `write_rating` saves one new or
//! changed score to u.data.
//!
//! Rust concepts you'll learn here:
//! - String parsing and splitting
//! - Error handling with `?` operator
//! - Converting between types (parsing strings to numbers and dates)

use crate::error::{DataLoadError, Result};
use crate::types::*;
use chrono::{NaiveDate, Utc};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Date format used by the release date column, e.g. "01-Jan-1995"
const RELEASE_DATE_FORMAT: &str = "%d-%b-%Y";

/// Helper function to read a file with ISO-8859-1 encoding (Latin-1)
///
/// The MovieLens titles use ISO-8859-1, not UTF-8. Each byte maps directly
/// to the Unicode code point of the same value.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(DataLoadError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let content: String = bytes.iter().map(|&b| b as char).collect();

    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Pull the next field off a split iterator, or report which one was missing
fn next_field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    file: &str,
    line: usize,
    name: &str,
) -> Result<&'a str> {
    parts.next().ok_or_else(|| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Missing {}", name),
    })
}

/// Parse a numeric id column
fn parse_id(value: &str, file: &str, line: usize, name: &str) -> Result<u32> {
    value.trim().parse().map_err(|e| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Invalid {}: {}", name, e),
    })
}

/// Empty columns become `None`
fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value) }
}

/// Parse the u.user file
///
/// Format: userId|age|gender|occupation|zipcode
///
/// Gender and occupation are not part of the profile and are skipped.
pub fn parse_users(path: &Path) -> Result<Vec<User>> {
    const FILE: &str = "u.user";
    let lines = read_lines_latin1(path)?;
    let mut users = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split('|');

        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let age = next_field(&mut parts, FILE, line_no, "age")?;
        let _gender = next_field(&mut parts, FILE, line_no, "gender")?;
        let _occupation = next_field(&mut parts, FILE, line_no, "occupation")?;
        let zipcode = next_field(&mut parts, FILE, line_no, "zipcode")?;

        let age = match non_empty(age) {
            Some(age) => Some(age.parse::<u8>().map_err(|e| DataLoadError::ParseError {
                file: FILE.to_string(),
                line: line_no,
                reason: format!("Invalid age: {}", e),
            })?),
            None => None,
        };

        users.push(User {
            id: parse_id(user_id, FILE, line_no, "userId")?,
            age,
            zipcode: non_empty(zipcode).map(str::to_string),
        });
    }

    Ok(users)
}

/// Parse the u.item file
///
/// Format: movieId|title|releaseDate|videoReleaseDate|imdbUrl|genre flags...
///
/// Only the first five columns are read. Release date and URL may be empty.
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    const FILE: &str = "u.item";
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split('|');

        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let title = next_field(&mut parts, FILE, line_no, "title")?;
        let released_at = next_field(&mut parts, FILE, line_no, "releaseDate")?;
        let _video_release = next_field(&mut parts, FILE, line_no, "videoReleaseDate")?;
        let imdb_url = next_field(&mut parts, FILE, line_no, "imdbUrl")?;

        let title = non_empty(title).ok_or_else(|| DataLoadError::ParseError {
            file: FILE.to_string(),
            line: line_no,
            reason: "Empty title".to_string(),
        })?;

        movies.push(Movie {
            id: parse_id(movie_id, FILE, line_no, "movieId")?,
            title: title.to_string(),
            released_at: parse_release_date(released_at, line_no)?,
            imdb_url: non_empty(imdb_url).map(str::to_string),
        });
    }

    Ok(movies)
}

/// Parse the u.data file
///
/// Format: userId<TAB>movieId<TAB>score<TAB>timestamp
///
/// Rating ids are assigned in file order starting at 1. The timestamp column
/// is not kept.
pub fn parse_ratings(path: &Path) -> Result<Vec<Rating>> {
    const FILE: &str = "u.data";
    let lines = read_lines_latin1(path)?;
    let mut ratings = Vec::with_capacity(lines.len());
    let mut next_id: RatingId = 1;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split_whitespace();

        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let score = next_field(&mut parts, FILE, line_no, "score")?;

        let rating = Rating {
            id: next_id,
            user_id: parse_id(user_id, FILE, line_no, "userId")?,
            movie_id: parse_id(movie_id, FILE, line_no, "movieId")?,
            score: score.parse().map_err(|e| DataLoadError::ParseError {
                file: FILE.to_string(),
                line: line_no,
                reason: format!("Invalid score: {}", e),
            })?,
        };

        next_id += 1;
        ratings.push(rating);
    }

    Ok(ratings)
}

/// Write one rating back to the u.data file
///
/// Rating ids count the non-empty lines, the same numbering `parse_ratings`
/// assigns. An existing rating is rewritten in place with its original
/// timestamp; the id after the last line is appended with the current time.
pub fn write_rating(path: &Path, rating: &Rating) -> Result<()> {
    const FILE: &str = "u.data";
    let mut lines = read_lines_latin1(path)?;

    let mut last_id: RatingId = 0;
    let mut target = None;
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        last_id += 1;
        if last_id == rating.id {
            target = Some(idx);
            break;
        }
    }

    match target {
        Some(idx) => {
            let line_no = idx + 1;
            let mut parts = lines[idx].split_whitespace();
            let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
            let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
            next_field(&mut parts, FILE, line_no, "score")?;
            let timestamp = parts.next().unwrap_or("0").to_string();

            let user_id = parse_id(user_id, FILE, line_no, "userId")?;
            let movie_id = parse_id(movie_id, FILE, line_no, "movieId")?;

            if user_id != rating.user_id || movie_id != rating.movie_id {
                return Err(DataLoadError::ParseError {
                    file: FILE.to_string(),
                    line: line_no,
                    reason: format!(
                        "Rating {} belongs to user {} and movie {}, not user {} and movie {}",
                        rating.id, user_id, movie_id, rating.user_id, rating.movie_id
                    ),
                });
            }
            lines[idx] = format_rating_line(rating, &timestamp);
        }
        None if rating.id == last_id + 1 => {
            let timestamp = Utc::now().timestamp().to_string();
            lines.push(format_rating_line(rating, &timestamp));
        }
        None => {
            return Err(DataLoadError::MissingReference {
                entity: "Rating".to_string(),
                id: rating.id,
            });
        }
    }

    write_lines_latin1(path, &lines)
}

fn format_rating_line(rating: &Rating, timestamp: &str) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        rating.user_id, rating.movie_id, rating.score, timestamp
    )
}

/// Replace a file with the given lines, encoded as ISO-8859-1
///
/// Content goes to a sibling file first and is renamed over the original.
fn write_lines_latin1(path: &Path, lines: &[String]) -> Result<()> {
    let mut bytes = Vec::new();
    for line in lines {
        // Lines came from `read_lines_latin1`, so every char fits in one byte
        bytes.extend(line.chars().map(|c| c as u8));
        bytes.push(b'\n');
    }

    let staging = path.with_extension("tmp");
    fs::write(&staging, &bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// Parse a release date such as "01-Jan-1995"
///
/// Example: "01-Jan-1995" -> Some(1995-01-01)
///          ""            -> None
fn parse_release_date(value: &str, line: usize) -> Result<Option<NaiveDate>> {
    let Some(value) = non_empty(value) else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(value, RELEASE_DATE_FORMAT)
        .map(Some)
        .map_err(|e| DataLoadError::ParseError {
            file: "u.item".to_string(),
            line,
            reason: format!("Invalid releaseDate '{}': {}", value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn test_parse_release_date() {
        assert_eq!(
            parse_release_date("01-Jan-1995", 1).unwrap(),
            NaiveDate::from_ymd_opt(1995, 1, 1)
        );
        assert_eq!(parse_release_date("", 1).unwrap(), None);
        assert!(parse_release_date("1995-01-01", 1).is_err());
    }

    #[test]
    fn test_parse_users() {
        let file = write_temp(b"1|24|M|technician|85711\n2|53|F|other|\n\n");
        let users = parse_users(file.path()).unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, 1);
        assert_eq!(users[0].age, Some(24));
        assert_eq!(users[0].zipcode.as_deref(), Some("85711"));
        assert_eq!(users[1].zipcode, None);
    }

    #[test]
    fn test_parse_users_missing_field() {
        let file = write_temp(b"1|24|M\n");
        let err = parse_users(file.path()).unwrap_err();
        assert!(matches!(err, DataLoadError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_parse_movies_latin1_and_optional_columns() {
        let file = write_temp(
            b"1|Toy Story (1995)|01-Jan-1995||http://us.imdb.com/M/title-exact?Toy%20Story%20(1995)|0|0|0|1|1|1\n\
              267|unknown||||1|0|0\n\
              3|Caf\xe9 au Lait (1994)|01-Jan-1994||http://example|0\n",
        );
        let movies = parse_movies(file.path()).unwrap();

        assert_eq!(movies.len(), 3);
        assert_eq!(movies[0].title, "Toy Story (1995)");
        assert_eq!(movies[0].released_at, NaiveDate::from_ymd_opt(1995, 1, 1));
        assert!(movies[0].imdb_url.is_some());
        assert_eq!(movies[1].released_at, None);
        assert_eq!(movies[1].imdb_url, None);
        assert_eq!(movies[2].title, "Café au Lait (1994)");
    }

    #[test]
    fn test_parse_ratings_assigns_ids_in_file_order() {
        let file = write_temp(b"196\t242\t3\t881250949\n186\t302\t3\t891717742\n");
        let ratings = parse_ratings(file.path()).unwrap();

        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].id, 1);
        assert_eq!(ratings[0].user_id, 196);
        assert_eq!(ratings[0].movie_id, 242);
        assert_eq!(ratings[0].score, 3);
        assert_eq!(ratings[1].id, 2);
    }

    #[test]
    fn test_parse_ratings_rejects_non_numeric_score() {
        let file = write_temp(b"196\t242\tgreat\t881250949\n");
        assert!(parse_ratings(file.path()).is_err());
    }

    #[test]
    fn test_write_rating_updates_line_in_place() {
        let file = write_temp(b"196\t242\t3\t881250949\n\n186\t302\t3\t891717742\n");
        let changed = Rating {
            id: 2,
            user_id: 186,
            movie_id: 302,
            score: 5,
        };

        write_rating(file.path(), &changed).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "196\t242\t3\t881250949\n\n186\t302\t5\t891717742\n");
        let ratings = parse_ratings(file.path()).unwrap();
        assert_eq!(ratings[1], changed);
    }

    #[test]
    fn test_write_rating_appends_next_id() {
        let file = write_temp(b"196\t242\t3\t881250949\n");
        let added = Rating {
            id: 2,
            user_id: 22,
            movie_id: 377,
            score: 1,
        };

        write_rating(file.path(), &added).unwrap();

        let ratings = parse_ratings(file.path()).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[1], added);
    }

    #[test]
    fn test_write_rating_rejects_mismatched_or_unknown_id() {
        let file = write_temp(b"196\t242\t3\t881250949\n");
        let wrong_owner = Rating {
            id: 1,
            user_id: 7,
            movie_id: 242,
            score: 4,
        };
        let gap = Rating {
            id: 5,
            user_id: 196,
            movie_id: 1,
            score: 4,
        };

        assert!(matches!(
            write_rating(file.path(), &wrong_owner),
            Err(DataLoadError::ParseError { line: 1, .. })
        ));
        assert!(matches!(
            write_rating(file.path(), &gap),
            Err(DataLoadError::MissingReference { id: 5, .. })
        ));
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "196\t242\t3\t881250949\n");
    }

    #[test]
    fn test_missing_file() {
        let err = parse_ratings(Path::new("does/not/exist/u.data")).unwrap_err();
        assert!(matches!(err, DataLoadError::FileNotFound { .. }));
    }
}
