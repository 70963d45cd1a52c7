#[macro_use]
extern crate rocket;

mod analysis;
mod analyzer;
mod api;
mod config;
mod db;
mod error;
mod models;
mod reconcile;
mod staleness;
mod stats;
mod telemetry;
mod validation;
mod wanikani;
#[cfg(test)]
mod test;

use api::{api_analyze, health};
use config::{Settings, load_environment};
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use tracing::info;

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            panic!("Invalid configuration: {}", e);
        }
    };

    let pool = SqlitePool::connect(&settings.database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool, settings).await
}

pub async fn init_rocket(pool: SqlitePool, settings: Settings) -> Rocket<Build> {
    info!("Starting kanji progress analyzer");

    rocket::build()
        .manage(pool)
        .manage(settings)
        .mount("/api", routes![api_analyze, health])
        .attach(TelemetryFairing)
}
