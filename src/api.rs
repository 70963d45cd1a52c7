use rocket::State;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::analyzer::{Analyzer, Summary};
use crate::config::Settings;
use crate::validation::AppErrorExt;
use crate::validation::JsonValidateExt;
use crate::validation::ValidationResponse;
use crate::wanikani::WaniKaniClient;

#[derive(Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, message = "API key is required"))]
    pub api_key: String,
}

#[post("/analyze", data = "<request>")]
pub async fn api_analyze(
    request: Json<AnalyzeRequest>,
    db: &State<Pool<Sqlite>>,
    settings: &State<Settings>,
) -> Result<Json<Summary>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;
    info!("Analyzing user data");

    let client = WaniKaniClient::new(settings, validated.api_key.trim()).validate_custom()?;
    let analyzer = Analyzer::new(&client, db, settings);

    let summary = analyzer.analyze().await.validate_custom()?;

    Ok(Json(summary))
}

#[get("/health")]
pub fn health() -> &'static str {
    "ok"
}
