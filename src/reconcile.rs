use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::debug;

use crate::db;
use crate::error::AppError;
use crate::models::{Assignment, LevelProgression, Review};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reconciled {
    Inserted,
    Updated,
}

/// A row keyed by a remote-assigned identity.
///
/// `update` only touches fields the remote side may revise; identity and
/// parent references are fixed by `insert`.
#[rocket::async_trait]
pub trait Upsert: Send + Sync {
    const KIND: &'static str;

    fn id(&self) -> i64;

    async fn exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError>;

    async fn insert(&self, pool: &Pool<Sqlite>) -> Result<(), AppError>;

    async fn update(&self, pool: &Pool<Sqlite>) -> Result<(), AppError>;
}

/// Insert `record` if its identity is new, otherwise update it in place.
/// Each call commits on its own; errors are returned untouched.
pub async fn reconcile<R: Upsert>(
    pool: &Pool<Sqlite>,
    record: &R,
) -> Result<Reconciled, AppError> {
    if R::exists(pool, record.id()).await? {
        record.update(pool).await?;
        debug!(kind = R::KIND, id = record.id(), "Updated");
        Ok(Reconciled::Updated)
    } else {
        record.insert(pool).await?;
        debug!(kind = R::KIND, id = record.id(), "Inserted");
        Ok(Reconciled::Inserted)
    }
}

#[rocket::async_trait]
impl Upsert for LevelProgression {
    const KIND: &'static str = "level_progression";

    fn id(&self) -> i64 {
        self.id
    }

    async fn exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        db::level_progression_exists(pool, id).await
    }

    async fn insert(&self, pool: &Pool<Sqlite>) -> Result<(), AppError> {
        db::insert_level_progression(pool, self).await
    }

    async fn update(&self, pool: &Pool<Sqlite>) -> Result<(), AppError> {
        db::update_level_progression(pool, self).await
    }
}

#[rocket::async_trait]
impl Upsert for Assignment {
    const KIND: &'static str = "assignment";

    fn id(&self) -> i64 {
        self.id
    }

    async fn exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        db::assignment_exists(pool, id).await
    }

    async fn insert(&self, pool: &Pool<Sqlite>) -> Result<(), AppError> {
        db::insert_assignment(pool, self).await
    }

    async fn update(&self, pool: &Pool<Sqlite>) -> Result<(), AppError> {
        db::update_assignment(pool, self).await
    }
}

#[rocket::async_trait]
impl Upsert for Review {
    const KIND: &'static str = "review";

    fn id(&self) -> i64 {
        self.id
    }

    async fn exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        db::review_exists(pool, id).await
    }

    async fn insert(&self, pool: &Pool<Sqlite>) -> Result<(), AppError> {
        db::insert_review(pool, self).await
    }

    async fn update(&self, pool: &Pool<Sqlite>) -> Result<(), AppError> {
        db::update_review(pool, self).await
    }
}
