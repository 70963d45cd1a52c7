use chrono::{DateTime, Utc};
use sqlx::{Executor, Pool, Sqlite};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::models::{
    Account, Assignment, DbAccount, LevelProgression, Review, SrsStage, Subject,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Review,
    Assignment,
    LevelProgression,
    SrsStage,
    Subject,
    Account,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Review => "review",
            Collection::Assignment => "assignment",
            Collection::LevelProgression => "level_progression",
            Collection::SrsStage => "stage",
            Collection::Subject => "subject",
            Collection::Account => "account",
        }
    }
}

/// Children before parents, so foreign keys never dangle mid-purge.
pub const PURGE_ORDER: [Collection; 6] = [
    Collection::Review,
    Collection::Assignment,
    Collection::LevelProgression,
    Collection::SrsStage,
    Collection::Subject,
    Collection::Account,
];

#[instrument(skip(pool))]
pub async fn count_rows(pool: &Pool<Sqlite>, collection: Collection) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;

    Ok(count)
}

#[instrument(skip(pool))]
pub async fn clear_collections(
    pool: &Pool<Sqlite>,
    collections: &[Collection],
) -> Result<u64, AppError> {
    info!("Clearing collections");
    let mut removed = 0;

    for collection in collections {
        let sql = format!("DELETE FROM {}", collection.table());
        let result = sqlx::query(&sql).execute(pool).await?;
        debug!(table = collection.table(), rows = result.rows_affected(), "Cleared table");
        removed += result.rows_affected();
    }

    Ok(removed)
}

#[instrument(skip(pool))]
pub async fn find_account_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<Account>, AppError> {
    info!("Looking up account by username");
    let row = sqlx::query_as::<_, DbAccount>(
        "SELECT id, username, level, last_synced_at, created_at FROM account WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Account::from))
}

#[instrument(skip(pool))]
pub async fn get_account(pool: &Pool<Sqlite>, id: i64) -> Result<Account, AppError> {
    let row = sqlx::query_as::<_, DbAccount>(
        "SELECT id, username, level, last_synced_at, created_at FROM account WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(account) => Ok(Account::from(account)),
        _ => Err(AppError::NotFound(format!(
            "Account with id {} not found in database",
            id
        ))),
    }
}

/// New accounts start without a sync time; the first completed fetch sets it.
#[instrument(skip(pool))]
pub async fn create_account(
    pool: &Pool<Sqlite>,
    username: &str,
    level: i64,
    created_at: DateTime<Utc>,
) -> Result<Account, AppError> {
    info!("Creating account");
    let res = sqlx::query("INSERT INTO account (username, level, created_at) VALUES (?, ?, ?)")
        .bind(username)
        .bind(level)
        .bind(created_at)
        .execute(pool)
        .await?;

    get_account(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn update_last_synced(
    pool: &Pool<Sqlite>,
    account_id: i64,
    synced_at: DateTime<Utc>,
) -> Result<(), AppError> {
    info!("Recording sync time");
    sqlx::query("UPDATE account SET last_synced_at = ? WHERE id = ?")
        .bind(synced_at)
        .bind(account_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn oldest_account_created_at(
    pool: &Pool<Sqlite>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let oldest: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT created_at FROM account ORDER BY created_at ASC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(oldest)
}

pub async fn insert_subject<'e, E>(executor: E, subject: &Subject) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO subject (id, level, type, image_url, characters) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(subject.id)
    .bind(subject.level)
    .bind(&subject.subject_type)
    .bind(&subject.image_url)
    .bind(&subject.characters)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_stage<'e, E>(executor: E, stage: &SrsStage) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO stage (id, name) VALUES (?, ?)")
        .bind(stage.id)
        .bind(&stage.name)
        .execute(executor)
        .await?;

    Ok(())
}

async fn row_exists(pool: &Pool<Sqlite>, sql: &str, id: i64) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar(sql).bind(id).fetch_optional(pool).await?;
    Ok(found.is_some())
}

pub async fn level_progression_exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
    row_exists(pool, "SELECT id FROM level_progression WHERE id = ?", id).await
}

pub async fn insert_level_progression(
    pool: &Pool<Sqlite>,
    progression: &LevelProgression,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO level_progression (id, user_id, level, started_at, passed_at, completed_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(progression.id)
    .bind(progression.user_id)
    .bind(progression.level)
    .bind(progression.started_at)
    .bind(progression.passed_at)
    .bind(progression.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_level_progression(
    pool: &Pool<Sqlite>,
    progression: &LevelProgression,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE level_progression
         SET started_at = ?, passed_at = ?, completed_at = ?
         WHERE id = ?",
    )
    .bind(progression.started_at)
    .bind(progression.passed_at)
    .bind(progression.completed_at)
    .bind(progression.id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub async fn get_level_progression(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<Option<LevelProgression>, AppError> {
    let row = sqlx::query_as::<_, LevelProgression>(
        "SELECT id, user_id, level, started_at, passed_at, completed_at
         FROM level_progression WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn assignment_exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
    row_exists(pool, "SELECT id FROM assignment WHERE id = ?", id).await
}

pub async fn insert_assignment(
    pool: &Pool<Sqlite>,
    assignment: &Assignment,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO assignment (id, user_id, subject_id, srs_stage, started_at, passed_at, burned_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(assignment.id)
    .bind(assignment.user_id)
    .bind(assignment.subject_id)
    .bind(assignment.srs_stage)
    .bind(assignment.started_at)
    .bind(assignment.passed_at)
    .bind(assignment.burned_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_assignment(
    pool: &Pool<Sqlite>,
    assignment: &Assignment,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE assignment
         SET srs_stage = ?, started_at = ?, passed_at = ?, burned_at = ?
         WHERE id = ?",
    )
    .bind(assignment.srs_stage)
    .bind(assignment.started_at)
    .bind(assignment.passed_at)
    .bind(assignment.burned_at)
    .bind(assignment.id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub async fn get_assignment(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<Option<Assignment>, AppError> {
    let row = sqlx::query_as::<_, Assignment>(
        "SELECT id, user_id, subject_id, srs_stage, started_at, passed_at, burned_at
         FROM assignment WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn review_exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
    row_exists(pool, "SELECT id FROM review WHERE id = ?", id).await
}

pub async fn insert_review(pool: &Pool<Sqlite>, review: &Review) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO review (id, user_id, assignment_id, starting_srs_stage, ending_srs_stage,
                             incorrect_meaning_answers, incorrect_reading_answers)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(review.id)
    .bind(review.user_id)
    .bind(review.assignment_id)
    .bind(review.starting_srs_stage)
    .bind(review.ending_srs_stage)
    .bind(review.incorrect_meaning_answers)
    .bind(review.incorrect_reading_answers)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_review(pool: &Pool<Sqlite>, review: &Review) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE review
         SET starting_srs_stage = ?, ending_srs_stage = ?,
             incorrect_meaning_answers = ?, incorrect_reading_answers = ?
         WHERE id = ?",
    )
    .bind(review.starting_srs_stage)
    .bind(review.ending_srs_stage)
    .bind(review.incorrect_meaning_answers)
    .bind(review.incorrect_reading_answers)
    .bind(review.id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub async fn get_review(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Review>, AppError> {
    let row = sqlx::query_as::<_, Review>(
        "SELECT id, user_id, assignment_id, starting_srs_stage, ending_srs_stage,
                incorrect_meaning_answers, incorrect_reading_answers
         FROM review WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
