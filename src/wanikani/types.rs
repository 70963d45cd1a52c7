use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    User,
    LevelProgressions,
    Assignments,
    Subjects,
    Reviews,
    SrsStages,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Resource::User => "user",
            Resource::LevelProgressions => "level_progressions",
            Resource::Assignments => "assignments",
            Resource::Subjects => "subjects",
            Resource::Reviews => "reviews",
            Resource::SrsStages => "srs_stages",
        }
    }

    pub fn banner(&self) -> &'static str {
        match self {
            Resource::User => "USER DATA",
            Resource::LevelProgressions => "LEVEL PROGRESSION DATA",
            Resource::Assignments => "ASSIGNMENT PROGRESS DATA",
            Resource::Subjects => "SUBJECT DATA",
            Resource::Reviews => "REVIEW DATA",
            Resource::SrsStages => "SRS STAGE DATA",
        }
    }
}

/// One page of a collection as the caller sees it.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Continuation token for the following page; `None` on the last one.
    pub next: Option<String>,
}

/// Collection body as it arrives on the wire.
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pages: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next_url: Option<String>,
}

impl<T> From<Collection<T>> for Page<T> {
    fn from(collection: Collection<T>) -> Self {
        Self {
            data: collection.data,
            next: collection.pages.and_then(|pages| pages.next_url),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A remote resource: stable identity, object tag and payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRecord<D> {
    pub id: i64,
    #[serde(default)]
    pub object: String,
    pub data: D,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserData {
    pub username: String,
    pub level: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelProgressionData {
    pub level: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub passed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentData {
    pub subject_id: i64,
    pub srs_stage: i64,
    #[serde(default)]
    pub srs_stage_name: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub passed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub burned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewData {
    pub assignment_id: i64,
    pub starting_srs_stage: i64,
    pub ending_srs_stage: i64,
    #[serde(default)]
    pub incorrect_meaning_answers: i64,
    #[serde(default)]
    pub incorrect_reading_answers: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectData {
    pub level: i64,
    #[serde(default)]
    pub characters: Option<String>,
    #[serde(default)]
    pub character_images: Vec<CharacterImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterImage {
    pub url: String,
    #[serde(default)]
    pub content_type: String,
}

/// SRS stages come flat, without the id/object/data wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct SrsStageData {
    pub srs_stage: i64,
    pub srs_stage_name: String,
}

pub type LevelProgressionRecord = RemoteRecord<LevelProgressionData>;
pub type AssignmentRecord = RemoteRecord<AssignmentData>;
pub type ReviewRecord = RemoteRecord<ReviewData>;
pub type SubjectRecord = RemoteRecord<SubjectData>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_with_next_page() {
        let body = r#"{
            "object": "collection",
            "pages": { "per_page": 500, "next_url": "https://api.wanikani.com/v2/reviews?page_after_id=99", "previous_url": null },
            "data": [
                { "id": 99, "object": "review", "data": {
                    "assignment_id": 5, "starting_srs_stage": 1, "ending_srs_stage": 2,
                    "incorrect_meaning_answers": 0, "incorrect_reading_answers": 1 } }
            ]
        }"#;

        let page: Page<ReviewRecord> = serde_json::from_str::<Collection<ReviewRecord>>(body)
            .unwrap()
            .into();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, 99);
        assert_eq!(page.data[0].data.incorrect_reading_answers, 1);
        assert_eq!(
            page.next.as_deref(),
            Some("https://api.wanikani.com/v2/reviews?page_after_id=99")
        );
    }

    #[test]
    fn test_last_page_and_missing_pages_block() {
        let last: Page<SrsStageData> = serde_json::from_str::<Collection<SrsStageData>>(
            r#"{ "pages": { "next_url": null }, "data": [] }"#,
        )
        .unwrap()
        .into();
        assert!(last.next.is_none());

        let flat: Page<SrsStageData> = serde_json::from_str::<Collection<SrsStageData>>(
            r#"{ "data": [ { "srs_stage": 0, "srs_stage_name": "Initiate" } ] }"#,
        )
        .unwrap()
        .into();
        assert!(flat.next.is_none());
        assert_eq!(flat.data[0].srs_stage_name, "Initiate");
    }

    #[test]
    fn test_fractional_second_timestamps_and_missing_fields() {
        let record: LevelProgressionRecord = serde_json::from_str(
            r#"{ "id": 7, "object": "level_progression", "data": {
                "level": 2, "started_at": "2017-09-05T23:38:10.695133Z" } }"#,
        )
        .unwrap();

        let started = record.data.started_at.expect("started_at should parse");
        assert_eq!(started.timestamp_subsec_micros(), 695133);
        assert!(record.data.passed_at.is_none());
        assert!(record.data.completed_at.is_none());
    }
}
