//! Fixed aggregate queries over one user's stored progress.
//!
//! Counts, groupings and accuracy ratios run in SQL. Durations and medians
//! are streamed out of SQLite row by row into the running aggregators, since
//! SQLite has neither `MEDIAN` nor a portable date difference.

use chrono::{DateTime, Utc};
use rocket::futures::TryStreamExt;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::stats::Aggregate;

/// How many entries the highest/lowest rankings keep.
pub const RANKING_SIZE: usize = 3;

#[derive(Debug, Serialize, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct CompletionTotals {
    pub total: i64,
    pub started: i64,
    pub passed: i64,
    pub completed: i64,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct DurationPair {
    pub pass_duration: Option<f64>,
    pub complete_duration: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DurationRanking<E> {
    pub pass_duration: Vec<E>,
    pub complete_duration: Vec<E>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DurationAggregates<E> {
    pub medians: DurationPair,
    pub averages: DurationPair,
    pub highest: DurationRanking<E>,
    pub lowest: DurationRanking<E>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LevelDuration {
    pub level: i64,
    pub pass_duration: Option<i64>,
    pub complete_duration: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LevelProgressionStats {
    pub totals: CompletionTotals,
    pub levels: Vec<LevelDuration>,
    pub aggregates: DurationAggregates<LevelDuration>,
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct StageCount {
    pub stage: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct LevelCount {
    pub level: i64,
    pub count: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SubjectDuration {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub characters: String,
    pub image_url: Option<String>,
    pub pass_duration: Option<i64>,
    pub complete_duration: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AssignmentTotals {
    #[serde(flatten)]
    pub completion: CompletionTotals,
    pub stage: Vec<StageCount>,
    pub level: Vec<LevelCount>,
    #[serde(rename = "type")]
    pub subject_type: Vec<TypeCount>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AssignmentStats {
    pub totals: AssignmentTotals,
    pub aggregates: DurationAggregates<SubjectDuration>,
    pub assignments: Vec<SubjectDuration>,
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Accuracy {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub accuracy: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AccuracyBreakdown {
    pub meaning: Vec<Accuracy>,
    pub reading: Vec<Accuracy>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReviewTotals {
    pub total: i64,
    pub stage: Vec<StageCount>,
    pub level: Vec<LevelCount>,
    #[serde(rename = "type")]
    pub subject_type: Vec<TypeCount>,
    pub accuracy: AccuracyBreakdown,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct ReviewFigures {
    pub incorrect_meanings: Option<f64>,
    pub incorrect_readings: Option<f64>,
    pub srs_stage_change: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct IncorrectSubject {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub characters: String,
    pub image_url: Option<String>,
    pub incorrect: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct IncorrectRanking {
    pub incorrect_meaning_answers: Vec<IncorrectSubject>,
    pub incorrect_reading_answers: Vec<IncorrectSubject>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReviewAggregates {
    pub medians: ReviewFigures,
    pub averages: ReviewFigures,
    pub highest: IncorrectRanking,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReviewStats {
    pub totals: ReviewTotals,
    pub aggregates: ReviewAggregates,
}

#[derive(sqlx::FromRow)]
struct LevelTimes {
    level: i64,
    started_at: Option<DateTime<Utc>>,
    passed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct AssignmentTimes {
    subject_type: String,
    characters: String,
    image_url: Option<String>,
    started_at: Option<DateTime<Utc>>,
    passed_at: Option<DateTime<Utc>>,
    burned_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ReviewNumbers {
    incorrect_meaning_answers: i64,
    incorrect_reading_answers: i64,
    srs_stage_change: i64,
}

/// Whole seconds from `start` to `end`; `None` unless both are known.
pub fn seconds_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<i64> {
    match (start, end) {
        (Some(start), Some(end)) => Some((end - start).num_seconds()),
        _ => None,
    }
}

/// Entries with a known duration ranked longest first, and the tail of that
/// ranking reversed so the shortest comes first.
pub fn rank_extremes<E, F>(entries: &[E], duration: F, n: usize) -> (Vec<E>, Vec<E>)
where
    E: Clone,
    F: Fn(&E) -> Option<i64>,
{
    let mut known: Vec<(i64, &E)> = entries
        .iter()
        .filter_map(|entry| duration(entry).map(|d| (d, entry)))
        .collect();
    known.sort_by(|a, b| b.0.cmp(&a.0));

    let highest = known.iter().take(n).map(|(_, e)| (*e).clone()).collect();
    let lowest = known.iter().rev().take(n).map(|(_, e)| (*e).clone()).collect();

    (highest, lowest)
}

fn duration_aggregates<E: Clone>(
    entries: &[E],
    pass: &Aggregate,
    complete: &Aggregate,
    pass_duration: impl Fn(&E) -> Option<i64>,
    complete_duration: impl Fn(&E) -> Option<i64>,
) -> DurationAggregates<E> {
    let (highest_pass, lowest_pass) = rank_extremes(entries, pass_duration, RANKING_SIZE);
    let (highest_complete, lowest_complete) =
        rank_extremes(entries, complete_duration, RANKING_SIZE);

    DurationAggregates {
        medians: DurationPair {
            pass_duration: pass.median(),
            complete_duration: complete.median(),
        },
        averages: DurationPair {
            pass_duration: pass.mean(),
            complete_duration: complete.mean(),
        },
        highest: DurationRanking {
            pass_duration: highest_pass,
            complete_duration: highest_complete,
        },
        lowest: DurationRanking {
            pass_duration: lowest_pass,
            complete_duration: lowest_complete,
        },
    }
}

#[instrument(skip(pool))]
pub async fn analyze_level_progressions(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<LevelProgressionStats, AppError> {
    info!("Analyzing level progressions");
    let totals = sqlx::query_as::<_, CompletionTotals>(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN passed_at IS NULL THEN 1 ELSE 0 END), 0) AS started,
                COUNT(passed_at) AS passed,
                COUNT(completed_at) AS completed
         FROM level_progression
         WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let mut rows = sqlx::query_as::<_, LevelTimes>(
        "SELECT level, started_at, passed_at, completed_at
         FROM level_progression
         WHERE user_id = ?
         ORDER BY level ASC",
    )
    .bind(user_id)
    .fetch(pool);

    let mut levels = Vec::new();
    let mut pass = Aggregate::default();
    let mut complete = Aggregate::default();

    while let Some(row) = rows.try_next().await? {
        let entry = LevelDuration {
            level: row.level,
            pass_duration: seconds_between(row.started_at, row.passed_at),
            complete_duration: seconds_between(row.started_at, row.completed_at),
        };
        pass.push_opt(entry.pass_duration.map(|d| d as f64));
        complete.push_opt(entry.complete_duration.map(|d| d as f64));
        levels.push(entry);
    }

    let aggregates = duration_aggregates(
        &levels,
        &pass,
        &complete,
        |l| l.pass_duration,
        |l| l.complete_duration,
    );

    Ok(LevelProgressionStats {
        totals,
        levels,
        aggregates,
    })
}

#[instrument(skip(pool))]
pub async fn analyze_assignments(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<AssignmentStats, AppError> {
    info!("Analyzing assignments");
    let completion = sqlx::query_as::<_, CompletionTotals>(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN passed_at IS NULL THEN 1 ELSE 0 END), 0) AS started,
                COUNT(passed_at) AS passed,
                COUNT(burned_at) AS completed
         FROM assignment
         WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let stage = sqlx::query_as::<_, StageCount>(
        "SELECT a.srs_stage AS stage, s.name AS name, COUNT(*) AS count
         FROM assignment a
         JOIN stage s ON a.srs_stage = s.id
         WHERE a.user_id = ?
         GROUP BY a.srs_stage, s.name
         ORDER BY a.srs_stage ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let level = sqlx::query_as::<_, LevelCount>(
        "SELECT s.level AS level, COUNT(*) AS count
         FROM assignment a
         JOIN subject s ON a.subject_id = s.id
         WHERE a.user_id = ?
         GROUP BY s.level
         ORDER BY s.level ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let subject_type = sqlx::query_as::<_, TypeCount>(
        "SELECT s.type AS subject_type, COUNT(*) AS count
         FROM assignment a
         JOIN subject s ON a.subject_id = s.id
         WHERE a.user_id = ?
         GROUP BY s.type
         ORDER BY s.type ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut rows = sqlx::query_as::<_, AssignmentTimes>(
        "SELECT s.type AS subject_type, s.characters, s.image_url,
                a.started_at, a.passed_at, a.burned_at
         FROM assignment a
         JOIN subject s ON a.subject_id = s.id
         WHERE a.user_id = ?
         ORDER BY a.id ASC",
    )
    .bind(user_id)
    .fetch(pool);

    let mut assignments = Vec::new();
    let mut pass = Aggregate::default();
    let mut complete = Aggregate::default();

    while let Some(row) = rows.try_next().await? {
        let entry = SubjectDuration {
            pass_duration: seconds_between(row.started_at, row.passed_at),
            complete_duration: seconds_between(row.started_at, row.burned_at),
            subject_type: row.subject_type,
            characters: row.characters,
            image_url: row.image_url,
        };
        pass.push_opt(entry.pass_duration.map(|d| d as f64));
        complete.push_opt(entry.complete_duration.map(|d| d as f64));
        assignments.push(entry);
    }

    let aggregates = duration_aggregates(
        &assignments,
        &pass,
        &complete,
        |a| a.pass_duration,
        |a| a.complete_duration,
    );

    Ok(AssignmentStats {
        totals: AssignmentTotals {
            completion,
            stage,
            level,
            subject_type,
        },
        aggregates,
        assignments,
    })
}

const REVIEW_SUBJECTS: &str = "FROM review r
     JOIN assignment a ON r.assignment_id = a.id
     JOIN subject s ON a.subject_id = s.id
     WHERE r.user_id = ?";

#[instrument(skip(pool))]
pub async fn analyze_reviews(pool: &Pool<Sqlite>, user_id: i64) -> Result<ReviewStats, AppError> {
    info!("Analyzing reviews");
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let stage = sqlx::query_as::<_, StageCount>(
        "SELECT r.starting_srs_stage AS stage, s.name AS name, COUNT(*) AS count
         FROM review r
         JOIN stage s ON r.starting_srs_stage = s.id
         WHERE r.user_id = ?
         GROUP BY r.starting_srs_stage, s.name
         ORDER BY r.starting_srs_stage ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let level = sqlx::query_as::<_, LevelCount>(&format!(
        "SELECT s.level AS level, COUNT(*) AS count {} GROUP BY s.level ORDER BY s.level ASC",
        REVIEW_SUBJECTS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let subject_type = sqlx::query_as::<_, TypeCount>(&format!(
        "SELECT s.type AS subject_type, COUNT(*) AS count {} GROUP BY s.type ORDER BY s.type ASC",
        REVIEW_SUBJECTS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let meaning = sqlx::query_as::<_, Accuracy>(&format!(
        "SELECT s.type AS subject_type,
                ROUND((1 - (SUM(r.incorrect_meaning_answers) * 1.0
                    / (COUNT(*) + SUM(r.incorrect_meaning_answers)))) * 100) AS accuracy
         {}
         GROUP BY s.type
         ORDER BY s.type ASC",
        REVIEW_SUBJECTS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    // Radicals have no reading to get wrong.
    let reading = sqlx::query_as::<_, Accuracy>(&format!(
        "SELECT s.type AS subject_type,
                ROUND((1 - (SUM(r.incorrect_reading_answers) * 1.0
                    / (COUNT(*) + SUM(r.incorrect_reading_answers)))) * 100) AS accuracy
         {} AND s.type <> 'radical'
         GROUP BY s.type
         ORDER BY s.type ASC",
        REVIEW_SUBJECTS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut rows = sqlx::query_as::<_, ReviewNumbers>(
        "SELECT incorrect_meaning_answers, incorrect_reading_answers,
                ending_srs_stage - starting_srs_stage AS srs_stage_change
         FROM review
         WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch(pool);

    let mut meanings = Aggregate::default();
    let mut readings = Aggregate::default();
    let mut stage_change = Aggregate::default();

    while let Some(row) = rows.try_next().await? {
        meanings.push(row.incorrect_meaning_answers as f64);
        readings.push(row.incorrect_reading_answers as f64);
        stage_change.push(row.srs_stage_change as f64);
    }
    drop(rows);

    let incorrect_meaning_answers = top_incorrect(pool, user_id, "incorrect_meaning_answers").await?;
    let incorrect_reading_answers = top_incorrect(pool, user_id, "incorrect_reading_answers").await?;

    Ok(ReviewStats {
        totals: ReviewTotals {
            total,
            stage,
            level,
            subject_type,
            accuracy: AccuracyBreakdown { meaning, reading },
        },
        aggregates: ReviewAggregates {
            medians: ReviewFigures {
                incorrect_meanings: meanings.median(),
                incorrect_readings: readings.median(),
                srs_stage_change: stage_change.median(),
            },
            averages: ReviewFigures {
                incorrect_meanings: meanings.mean(),
                incorrect_readings: readings.mean(),
                srs_stage_change: stage_change.mean(),
            },
            highest: IncorrectRanking {
                incorrect_meaning_answers,
                incorrect_reading_answers,
            },
        },
    })
}

/// Subjects with the most incorrect answers in `column`, most first.
async fn top_incorrect(
    pool: &Pool<Sqlite>,
    user_id: i64,
    column: &'static str,
) -> Result<Vec<IncorrectSubject>, AppError> {
    let rows = sqlx::query_as::<_, IncorrectSubject>(&format!(
        "SELECT s.type AS subject_type, s.characters, s.image_url, SUM(r.{column}) AS incorrect
         {REVIEW_SUBJECTS}
         GROUP BY s.id
         ORDER BY incorrect DESC, s.id ASC
         LIMIT {RANKING_SIZE}"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(level: i64, pass: Option<i64>) -> LevelDuration {
        LevelDuration {
            level,
            pass_duration: pass,
            complete_duration: None,
        }
    }

    #[test]
    fn test_seconds_between() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            seconds_between(Some(start), Some(start + Duration::hours(2))),
            Some(7200)
        );
        assert_eq!(seconds_between(Some(start), None), None);
        assert_eq!(seconds_between(None, Some(start)), None);
    }

    #[test]
    fn test_rank_extremes_orders_both_ends() {
        let entries = vec![
            entry(1, Some(50)),
            entry(2, None),
            entry(3, Some(10)),
            entry(4, Some(40)),
            entry(5, Some(30)),
            entry(6, Some(20)),
        ];

        let (highest, lowest) = rank_extremes(&entries, |e| e.pass_duration, 3);

        let high: Vec<i64> = highest.iter().map(|e| e.level).collect();
        let low: Vec<i64> = lowest.iter().map(|e| e.level).collect();
        assert_eq!(high, vec![1, 4, 5]);
        assert_eq!(low, vec![3, 6, 5]);
    }

    #[test]
    fn test_rank_extremes_with_fewer_entries_than_requested() {
        let entries = vec![entry(1, Some(5)), entry(2, None)];
        let (highest, lowest) = rank_extremes(&entries, |e| e.pass_duration, 3);

        assert_eq!(highest.len(), 1);
        assert_eq!(lowest.len(), 1);
        assert_eq!(highest[0].level, 1);

        let (highest, lowest) = rank_extremes(&[entry(1, None)], |e| e.pass_duration, 3);
        assert!(highest.is_empty());
        assert!(lowest.is_empty());
    }
}
