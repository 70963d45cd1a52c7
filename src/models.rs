use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::wanikani::{
    AssignmentRecord, LevelProgressionRecord, ReviewRecord, SrsStageData, SubjectRecord,
};

/// Shown in place of characters for subjects that only exist as an image.
pub const RADICAL_PLACEHOLDER: &str = "[Radical]";

#[derive(Debug, Serialize, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub level: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAccount {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub level: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbAccount> for Account {
    fn from(account: DbAccount) -> Self {
        Self {
            id: account.id.unwrap_or_default(),
            username: account.username.unwrap_or_default(),
            level: account.level.unwrap_or_default(),
            last_synced_at: account.last_synced_at,
            created_at: account.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct LevelProgression {
    pub id: i64,
    pub user_id: i64,
    pub level: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub passed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LevelProgression {
    pub fn from_remote(user_id: i64, record: LevelProgressionRecord) -> Self {
        Self {
            id: record.id,
            user_id,
            level: record.data.level,
            started_at: record.data.started_at,
            passed_at: record.data.passed_at,
            completed_at: record.data.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Assignment {
    pub id: i64,
    pub user_id: i64,
    pub subject_id: i64,
    pub srs_stage: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub passed_at: Option<DateTime<Utc>>,
    pub burned_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn from_remote(user_id: i64, record: AssignmentRecord) -> Self {
        Self {
            id: record.id,
            user_id,
            subject_id: record.data.subject_id,
            srs_stage: record.data.srs_stage,
            started_at: record.data.started_at,
            passed_at: record.data.passed_at,
            burned_at: record.data.burned_at,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub assignment_id: i64,
    pub starting_srs_stage: i64,
    pub ending_srs_stage: i64,
    pub incorrect_meaning_answers: i64,
    pub incorrect_reading_answers: i64,
}

impl Review {
    pub fn from_remote(user_id: i64, record: ReviewRecord) -> Self {
        Self {
            id: record.id,
            user_id,
            assignment_id: record.data.assignment_id,
            starting_srs_stage: record.data.starting_srs_stage,
            ending_srs_stage: record.data.ending_srs_stage,
            incorrect_meaning_answers: record.data.incorrect_meaning_answers,
            incorrect_reading_answers: record.data.incorrect_reading_answers,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Subject {
    pub id: i64,
    pub level: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub subject_type: String,
    pub image_url: Option<String>,
    pub characters: String,
}

impl Subject {
    /// Resolves the display text and image once, at import time. Subjects
    /// without characters get the placeholder and, for radicals, the first
    /// PNG rendition if one exists.
    pub fn from_remote(record: SubjectRecord) -> Self {
        let characters = record.data.characters.filter(|c| !c.is_empty());

        let image_url = match (&characters, record.object.as_str()) {
            (None, "radical") => record
                .data
                .character_images
                .iter()
                .find(|image| image.content_type == "image/png")
                .map(|image| image.url.clone()),
            _ => None,
        };

        Self {
            id: record.id,
            level: record.data.level,
            subject_type: record.object,
            image_url,
            characters: characters.unwrap_or_else(|| RADICAL_PLACEHOLDER.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, sqlx::FromRow)]
pub struct SrsStage {
    pub id: i64,
    pub name: String,
}

impl From<SrsStageData> for SrsStage {
    fn from(stage: SrsStageData) -> Self {
        Self {
            id: stage.srs_stage,
            name: stage.srs_stage_name,
        }
    }
}
