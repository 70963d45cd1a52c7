#[cfg(test)]
pub mod test_utils {
    use crate::config::Settings;
    use crate::db::{create_account, insert_stage, insert_subject, update_last_synced};
    use crate::error::AppError;
    use crate::models::{SrsStage, Subject};
    use crate::wanikani::{Page, RemoteSource, Resource, UserData};
    use chrono::{DateTime, TimeZone, Utc};
    use rocket::local::asynchronous::Client;
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
    use std::collections::HashMap;
    use std::sync::{Mutex, Once};
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();

    pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, 0)
            .single()
            .expect("valid test timestamp")
    }

    pub struct TestAccount {
        pub username: String,
        pub level: i64,
        pub created_at: DateTime<Utc>,
        pub last_synced_at: Option<DateTime<Utc>>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        accounts: Vec<TestAccount>,
        stages: Vec<SrsStage>,
        subjects: Vec<Subject>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn account(
            mut self,
            username: &str,
            level: i64,
            created_at: DateTime<Utc>,
            last_synced_at: Option<DateTime<Utc>>,
        ) -> Self {
            self.accounts.push(TestAccount {
                username: username.to_string(),
                level,
                created_at,
                last_synced_at,
            });
            self
        }

        pub fn stage(mut self, id: i64, name: &str) -> Self {
            self.stages.push(SrsStage {
                id,
                name: name.to_string(),
            });
            self
        }

        pub fn standard_stages(self) -> Self {
            STAGE_NAMES
                .iter()
                .enumerate()
                .fold(self, |builder, (id, name)| builder.stage(id as i64, name))
        }

        pub fn subject(mut self, id: i64, subject_type: &str, level: i64, characters: &str) -> Self {
            self.subjects.push(Subject {
                id,
                level,
                subject_type: subject_type.to_string(),
                image_url: None,
                characters: characters.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            // Every connection to `sqlite::memory:` is its own database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            for stage in &self.stages {
                insert_stage(&pool, stage).await?;
            }

            for subject in &self.subjects {
                insert_subject(&pool, subject).await?;
            }

            let mut account_ids = HashMap::new();
            for account in &self.accounts {
                let created =
                    create_account(&pool, &account.username, account.level, account.created_at)
                        .await?;
                if let Some(synced) = account.last_synced_at {
                    update_last_synced(&pool, created.id, synced).await?;
                }
                account_ids.insert(account.username.clone(), created.id);
            }

            Ok(TestDb { pool, account_ids })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub account_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn account_id(&self, username: &str) -> Option<i64> {
            self.account_ids.get(username).copied()
        }
    }

    pub async fn setup_test_client(test_db: &TestDb) -> Client {
        let rocket = crate::init_rocket(test_db.pool.clone(), Settings::default()).await;
        Client::tracked(rocket)
            .await
            .expect("valid rocket instance")
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct FakeCall {
        pub resource: Resource,
        pub cursor: Option<String>,
    }

    /// In-memory remote serving wire-format JSON, one `Vec<Value>` per page.
    pub struct FakeSource {
        user: Mutex<Value>,
        pages: Mutex<HashMap<Resource, Vec<Vec<Value>>>>,
        failures: Mutex<Vec<(Resource, usize)>>,
        calls: Mutex<Vec<FakeCall>>,
    }

    impl FakeSource {
        pub fn new(username: &str, level: i64) -> Self {
            Self {
                user: Mutex::new(json!({
                    "username": username,
                    "level": level,
                    "started_at": "2024-01-01T00:00:00.000000Z",
                })),
                pages: Mutex::new(HashMap::new()),
                failures: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_pages(self, resource: Resource, pages: Vec<Vec<Value>>) -> Self {
            self.set_pages(resource, pages);
            self
        }

        pub fn set_pages(&self, resource: Resource, pages: Vec<Vec<Value>>) {
            self.pages.lock().unwrap().insert(resource, pages);
        }

        /// Makes the fetch of `page` (zero-based) of `resource` fail.
        pub fn fail_on(&self, resource: Resource, page: usize) {
            self.failures.lock().unwrap().push((resource, page));
        }

        pub fn clear_failures(&self) {
            self.failures.lock().unwrap().clear();
        }

        pub fn calls(&self) -> Vec<FakeCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn requested_resources(&self) -> Vec<Resource> {
            self.calls().into_iter().map(|call| call.resource).collect()
        }

        pub fn reset_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn cursor_for(resource: Resource, index: usize) -> String {
            format!("fake://{}?page={}", resource.path(), index)
        }

        fn page_index(cursor: Option<&str>) -> Result<usize, AppError> {
            match cursor {
                None => Ok(0),
                Some(cursor) => cursor
                    .rsplit_once("page=")
                    .and_then(|(_, index)| index.parse().ok())
                    .ok_or_else(|| AppError::ExternalService(format!("Bad cursor {}", cursor))),
            }
        }
    }

    #[rocket::async_trait]
    impl RemoteSource for FakeSource {
        async fn user(&self) -> Result<UserData, AppError> {
            self.calls.lock().unwrap().push(FakeCall {
                resource: Resource::User,
                cursor: None,
            });
            let user = self.user.lock().unwrap().clone();
            Ok(serde_json::from_value(user)?)
        }

        async fn page<T>(&self, resource: Resource, cursor: Option<&str>) -> Result<Page<T>, AppError>
        where
            T: DeserializeOwned + Send + 'static,
        {
            self.calls.lock().unwrap().push(FakeCall {
                resource,
                cursor: cursor.map(String::from),
            });

            let index = Self::page_index(cursor)?;
            if self.failures.lock().unwrap().contains(&(resource, index)) {
                return Err(AppError::ExternalService(format!(
                    "Simulated failure on {} page {}",
                    resource.path(),
                    index
                )));
            }

            let (records, last) = {
                let pages = self.pages.lock().unwrap();
                let resource_pages = pages.get(&resource).cloned().unwrap_or_default();
                let last = index + 1 >= resource_pages.len();
                let records = resource_pages.get(index).cloned().unwrap_or_default();
                (records, last)
            };

            let data: Vec<T> = serde_json::from_value(Value::Array(records))?;
            let next = if last {
                None
            } else {
                Some(Self::cursor_for(resource, index + 1))
            };

            Ok(Page { data, next })
        }
    }

    pub const STAGE_NAMES: [&str; 10] = [
        "Initiate",
        "Apprentice I",
        "Apprentice II",
        "Apprentice III",
        "Apprentice IV",
        "Guru I",
        "Guru II",
        "Master",
        "Enlightened",
        "Burned",
    ];

    pub fn stage_records() -> Vec<Value> {
        STAGE_NAMES
            .iter()
            .enumerate()
            .map(|(id, name)| json!({ "srs_stage": id, "srs_stage_name": name }))
            .collect()
    }

    pub fn subject_record(id: i64, object: &str, level: i64, characters: Option<&str>) -> Value {
        json!({
            "id": id,
            "object": object,
            "data": {
                "level": level,
                "characters": characters,
                "character_images": [
                    { "url": format!("https://files.example/{}.svg", id), "content_type": "image/svg+xml" },
                    { "url": format!("https://files.example/{}.png", id), "content_type": "image/png" }
                ]
            }
        })
    }

    pub fn level_progression_record(
        id: i64,
        level: i64,
        started_at: Option<&str>,
        passed_at: Option<&str>,
        completed_at: Option<&str>,
    ) -> Value {
        json!({
            "id": id,
            "object": "level_progression",
            "data": {
                "level": level,
                "started_at": started_at,
                "passed_at": passed_at,
                "completed_at": completed_at
            }
        })
    }

    pub fn assignment_record(
        id: i64,
        subject_id: i64,
        srs_stage: i64,
        started_at: Option<&str>,
        passed_at: Option<&str>,
        burned_at: Option<&str>,
    ) -> Value {
        json!({
            "id": id,
            "object": "assignment",
            "data": {
                "subject_id": subject_id,
                "srs_stage": srs_stage,
                "srs_stage_name": STAGE_NAMES.get(srs_stage as usize),
                "started_at": started_at,
                "passed_at": passed_at,
                "burned_at": burned_at
            }
        })
    }

    pub fn review_record(
        id: i64,
        assignment_id: i64,
        starting_srs_stage: i64,
        ending_srs_stage: i64,
        incorrect_meaning_answers: i64,
        incorrect_reading_answers: i64,
    ) -> Value {
        json!({
            "id": id,
            "object": "review",
            "data": {
                "assignment_id": assignment_id,
                "starting_srs_stage": starting_srs_stage,
                "ending_srs_stage": ending_srs_stage,
                "incorrect_meaning_answers": incorrect_meaning_answers,
                "incorrect_reading_answers": incorrect_reading_answers
            }
        })
    }

    /// Reference data shared by the scenario tests: one plain radical, one
    /// image-only radical, two kanji and a vocabulary word.
    pub fn standard_subjects() -> Vec<Value> {
        vec![
            subject_record(1, "radical", 1, Some("一")),
            subject_record(2, "radical", 1, None),
            subject_record(440, "kanji", 1, Some("一")),
            subject_record(441, "kanji", 1, Some("二")),
            subject_record(2467, "vocabulary", 2, Some("一つ")),
        ]
    }

    /// alice at level 3: level 1 finished, level 2 still in progress; three
    /// assignments and four reviews split over two pages.
    pub fn standard_source() -> FakeSource {
        FakeSource::new("alice", 3)
            .with_pages(Resource::Subjects, vec![standard_subjects()])
            .with_pages(Resource::SrsStages, vec![stage_records()])
            .with_pages(
                Resource::LevelProgressions,
                vec![vec![
                    level_progression_record(
                        101,
                        1,
                        Some("2024-01-01T00:00:00.000000Z"),
                        Some("2024-01-08T00:00:00.000000Z"),
                        Some("2024-01-10T00:00:00.000000Z"),
                    ),
                    level_progression_record(
                        102,
                        2,
                        Some("2024-01-08T00:00:00.000000Z"),
                        None,
                        None,
                    ),
                ]],
            )
            .with_pages(
                Resource::Assignments,
                vec![vec![
                    assignment_record(
                        1,
                        1,
                        5,
                        Some("2024-01-01T00:00:00.000000Z"),
                        Some("2024-01-03T00:00:00.000000Z"),
                        None,
                    ),
                    assignment_record(
                        2,
                        440,
                        9,
                        Some("2024-01-02T00:00:00.000000Z"),
                        Some("2024-01-06T00:00:00.000000Z"),
                        Some("2024-06-01T00:00:00.000000Z"),
                    ),
                    assignment_record(
                        3,
                        2467,
                        1,
                        Some("2024-01-09T00:00:00.000000Z"),
                        None,
                        None,
                    ),
                ]],
            )
            .with_pages(
                Resource::Reviews,
                vec![
                    vec![review_record(10, 1, 1, 2, 1, 0), review_record(11, 2, 4, 5, 0, 2)],
                    vec![review_record(12, 2, 5, 4, 2, 3), review_record(13, 3, 1, 2, 0, 1)],
                ],
            )
    }
}
