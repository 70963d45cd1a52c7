//! Remote collaborator for the WaniKani v2 API.
//!
//! `RemoteSource` is the seam the analyzer depends on; `WaniKaniClient` is the
//! HTTP implementation and tests supply their own. `Pages` walks a resource
//! from its first page to its last.

use std::marker::PhantomData;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::Settings;
use crate::error::AppError;

use super::types::{Collection, Envelope, Page, Resource, UserData};

const MAX_LOG_BODY_CHARS: usize = 512;

#[rocket::async_trait]
pub trait RemoteSource: Send + Sync {
    async fn user(&self) -> Result<UserData, AppError>;

    /// Fetch one page of `resource`. `cursor` is `None` for the first page and
    /// otherwise the `next` token of the previous page.
    async fn page<T>(&self, resource: Resource, cursor: Option<&str>) -> Result<Page<T>, AppError>
    where
        T: DeserializeOwned + Send + 'static;
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazy walk over every page of one resource.
///
/// A failed fetch ends the walk; retrying means starting a new `Pages` from
/// page one.
pub struct Pages<'a, S, T> {
    source: &'a S,
    resource: Resource,
    cursor: Cursor,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, S, T> Pages<'a, S, T>
where
    S: RemoteSource,
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(source: &'a S, resource: Resource) -> Self {
        Self {
            source,
            resource,
            cursor: Cursor::Start,
            _marker: PhantomData,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Page<T>>, AppError> {
        let cursor = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok(None),
        };

        let page = self
            .source
            .page::<T>(self.resource, cursor.as_deref())
            .await?;

        if let Some(next) = &page.next {
            self.cursor = Cursor::Next(next.clone());
        }

        Ok(Some(page))
    }
}

#[derive(Debug, Clone)]
pub struct WaniKaniClient {
    client: reqwest::Client,
    base_url: String,
}

impl WaniKaniClient {
    pub fn new(settings: &Settings, api_key: &str) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| AppError::Validation("API key contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let revision = HeaderValue::from_str(&settings.api_revision)
            .map_err(|_| AppError::Validation("Invalid API revision".into()))?;
        headers.insert("Wanikani-Revision", revision);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, resource: Resource) -> String {
        format!("{}/{}", self.base_url, resource.path())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
            if body.chars().count() > MAX_LOG_BODY_CHARS {
                preview.push_str("...");
            }
            debug!(%status, body = %preview, "Remote API error response");

            return Err(if status == reqwest::StatusCode::UNAUTHORIZED {
                AppError::Authentication("Remote API rejected the API key".to_string())
            } else {
                AppError::ExternalService(format!("Remote API returned {} for {}", status, url))
            });
        }

        debug!(%status, url, "Remote API response");
        Ok(serde_json::from_str(&body)?)
    }
}

#[rocket::async_trait]
impl RemoteSource for WaniKaniClient {
    #[instrument(skip(self))]
    async fn user(&self) -> Result<UserData, AppError> {
        let envelope: Envelope<UserData> = self.get_json(&self.endpoint(Resource::User)).await?;
        Ok(envelope.data)
    }

    #[instrument(skip(self))]
    async fn page<T>(&self, resource: Resource, cursor: Option<&str>) -> Result<Page<T>, AppError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = match cursor {
            Some(next_url) => next_url.to_string(),
            None => self.endpoint(resource),
        };

        let collection: Collection<T> = self.get_json(&url).await?;
        Ok(collection.into())
    }
}
