//! One analysis run for the user behind a `RemoteSource`.
//!
//! Expired data is purged first, then the shared reference data (subjects and
//! SRS stages) is imported if missing. The user's own progress is re-fetched
//! only when the account's last sync is outside the cache window, and the
//! summary is always computed from what is stored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{Pool, Sqlite};
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::analysis::{
    self, AssignmentStats, LevelProgressionStats, ReviewStats,
};
use crate::config::Settings;
use crate::db::{self, Collection, PURGE_ORDER};
use crate::error::AppError;
use crate::models::{Account, Assignment, LevelProgression, Review, SrsStage, Subject};
use crate::reconcile::{Reconciled, Upsert, reconcile};
use crate::staleness::{is_dataset_expired, should_use_cached_data};
use crate::wanikani::{
    AssignmentRecord, LevelProgressionRecord, Pages, RemoteSource, Resource, ReviewRecord,
    SrsStageData, SubjectRecord, UserData,
};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResourceReport {
    pub resource: Resource,
    pub pages: u64,
    pub inserted: u64,
    pub updated: u64,
}

impl ResourceReport {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            pages: 0,
            inserted: 0,
            updated: 0,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SyncReport {
    pub purged: bool,
    pub bootstrapped: Vec<ResourceReport>,
    pub used_cache: bool,
    pub synced: Vec<ResourceReport>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub level: i64,
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Summary {
    pub user: UserSummary,
    pub sync: SyncReport,
    pub level_progressions: LevelProgressionStats,
    pub assignments: AssignmentStats,
    pub reviews: ReviewStats,
}

/// The cache verdict for one run, carried explicitly through the sync.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub account: Account,
    pub use_cached: bool,
}

pub struct Analyzer<'a, S> {
    source: &'a S,
    pool: &'a Pool<Sqlite>,
    settings: &'a Settings,
}

impl<'a, S: RemoteSource> Analyzer<'a, S> {
    pub fn new(source: &'a S, pool: &'a Pool<Sqlite>, settings: &'a Settings) -> Self {
        Self {
            source,
            pool,
            settings,
        }
    }

    pub async fn analyze(&self) -> Result<Summary, AppError> {
        self.analyze_at(Utc::now()).await
    }

    /// Runs the whole sync as of `now`. Any fetch or storage failure aborts
    /// the run; rows reconciled before the failure stay committed.
    pub async fn analyze_at(&self, now: DateTime<Utc>) -> Result<Summary, AppError> {
        let span = info_span!("analyze", sync_id = %Uuid::new_v4());

        async move {
            let purged = self.purge_expired(now).await?;
            let bootstrapped = self.bootstrap_reference_data().await?;

            let user = self.source.user().await?;
            info!(username = %user.username, level = user.level, "Fetched user");

            let plan = self.plan(&user, now).await?;

            let synced = if plan.use_cached {
                info!("Using cached data");
                Vec::new()
            } else {
                info!("Processing new data...");
                let reports = self.fetch_progress(plan.account.id).await?;
                self.mark_synced(&plan.account, now).await?;
                reports
            };

            let user_id = plan.account.id;
            let summary = Summary {
                user: UserSummary {
                    id: user_id,
                    username: user.username,
                    level: user.level,
                    start_date: user.started_at,
                },
                sync: SyncReport {
                    purged,
                    bootstrapped,
                    used_cache: plan.use_cached,
                    synced,
                },
                level_progressions: analysis::analyze_level_progressions(self.pool, user_id)
                    .await?,
                assignments: analysis::analyze_assignments(self.pool, user_id).await?,
                reviews: analysis::analyze_reviews(self.pool, user_id).await?,
            };

            info!(
                levels = summary.level_progressions.totals.total,
                assignments = summary.assignments.totals.completion.total,
                reviews = summary.reviews.totals.total,
                "Analysis complete"
            );

            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Empties every table once the oldest account outlives the retention
    /// window.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<bool, AppError> {
        let oldest = db::oldest_account_created_at(self.pool).await?;

        if !is_dataset_expired(oldest, now, self.settings.retention) {
            return Ok(false);
        }

        info!(oldest = ?oldest, "Clearing stale data...");
        db::clear_collections(self.pool, &PURGE_ORDER).await?;
        Ok(true)
    }

    /// Imports subjects, then SRS stages, into empty tables. Each import is
    /// one transaction, so a failed fetch leaves its table empty for the next
    /// run to retry.
    async fn bootstrap_reference_data(&self) -> Result<Vec<ResourceReport>, AppError> {
        let mut reports = Vec::new();

        if db::count_rows(self.pool, Collection::Subject).await? == 0 {
            info!("Processing subject info...");
            let mut report = ResourceReport::new(Resource::Subjects);
            let mut pages = Pages::<S, SubjectRecord>::new(self.source, Resource::Subjects);
            let mut tx = self.pool.begin().await?;

            while let Some(page) = pages.next_page().await? {
                report.pages += 1;
                for record in page.data {
                    let subject = Subject::from_remote(record);
                    db::insert_subject(&mut *tx, &subject).await?;
                    report.inserted += 1;
                }
            }

            tx.commit().await?;
            reports.push(report);
        }

        if db::count_rows(self.pool, Collection::SrsStage).await? == 0 {
            info!("Processing SRS stage info...");
            let mut report = ResourceReport::new(Resource::SrsStages);
            let mut pages = Pages::<S, SrsStageData>::new(self.source, Resource::SrsStages);
            let mut tx = self.pool.begin().await?;

            while let Some(page) = pages.next_page().await? {
                report.pages += 1;
                for record in page.data {
                    db::insert_stage(&mut *tx, &SrsStage::from(record)).await?;
                    report.inserted += 1;
                }
            }

            tx.commit().await?;
            reports.push(report);
        }

        Ok(reports)
    }

    /// Resolves the account for `user` and decides whether stored data can be
    /// reused. Accounts created here have never synced and always fetch.
    pub async fn plan(&self, user: &UserData, now: DateTime<Utc>) -> Result<SyncPlan, AppError> {
        match db::find_account_by_username(self.pool, &user.username).await? {
            Some(account) => {
                let use_cached =
                    should_use_cached_data(account.last_synced_at, now, self.settings.cache_ttl);
                Ok(SyncPlan {
                    account,
                    use_cached,
                })
            }
            None => {
                let account =
                    db::create_account(self.pool, &user.username, user.level, now).await?;
                Ok(SyncPlan {
                    account,
                    use_cached: false,
                })
            }
        }
    }

    async fn mark_synced(&self, account: &Account, now: DateTime<Utc>) -> Result<(), AppError> {
        let synced_at = match account.last_synced_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        db::update_last_synced(self.pool, account.id, synced_at).await
    }

    /// Level progressions, then assignments, then reviews; each resource is
    /// drained before the next one starts.
    async fn fetch_progress(&self, user_id: i64) -> Result<Vec<ResourceReport>, AppError> {
        let progressions = self
            .sync_resource(Resource::LevelProgressions, |record: LevelProgressionRecord| {
                LevelProgression::from_remote(user_id, record)
            })
            .await?;

        let assignments = self
            .sync_resource(Resource::Assignments, |record: AssignmentRecord| {
                Assignment::from_remote(user_id, record)
            })
            .await?;

        let reviews = self
            .sync_resource(Resource::Reviews, |record: ReviewRecord| {
                Review::from_remote(user_id, record)
            })
            .await?;

        Ok(vec![progressions, assignments, reviews])
    }

    async fn sync_resource<T, R, F>(
        &self,
        resource: Resource,
        to_row: F,
    ) -> Result<ResourceReport, AppError>
    where
        T: DeserializeOwned + Send + 'static,
        R: Upsert,
        F: Fn(T) -> R + Send + Sync,
    {
        info!("======== {} ========", resource.banner());
        let mut report = ResourceReport::new(resource);
        let mut pages = Pages::<S, T>::new(self.source, resource);

        while let Some(page) = pages.next_page().await? {
            report.pages += 1;
            debug!(page = report.pages, records = page.data.len(), "Reconciling page");

            for record in page.data {
                let row = to_row(record);
                match reconcile(self.pool, &row).await? {
                    Reconciled::Inserted => report.inserted += 1,
                    Reconciled::Updated => report.updated += 1,
                }
            }
        }

        info!(
            resource = resource.path(),
            pages = report.pages,
            inserted = report.inserted,
            updated = report.updated,
            "Resource synced"
        );
        Ok(report)
    }
}
