use anyhow::{anyhow, Context, Result};
use reqwest::{header::HeaderValue, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::env;
use tokio::time::{sleep, Duration};
use tracing::debug;

mod file_search;
mod generate;

pub use file_search::{FileSearchStore, Operation, OperationError, OperationResponse, RemoteDocument};
pub use generate::{
    Candidate, Content, GenerateRequest, GenerateResponse, GroundingChunk, GroundingMetadata, Part,
    RetrievedContext,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_RETRIES: usize = 6;

/// Thin client for the Gemini REST API (`v1beta`): file search stores and
/// `generateContent`. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow!("gemini api key must not be empty"));
        }
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("gemini base url must not be empty"));
        }
        Ok(Self {
            http: Client::new(),
            api_key,
            base_url,
        })
    }

    /// Reads `GOOGLE_API_KEY` and the optional `GEMINI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = read_api_key("GOOGLE_API_KEY")?;
        let base_url = env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(api_key, base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, resource: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, resource.trim_start_matches('/'))
    }

    fn upload_url(&self, resource: &str) -> String {
        format!(
            "{}/upload/v1beta/{}",
            self.base_url,
            resource.trim_start_matches('/')
        )
    }

    /// Sends `request` with the api key attached. Only 429 responses are
    /// retried, with exponential backoff; transport errors fail at once since
    /// uploads and generation are not idempotent.
    async fn execute(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let pending = request
                .try_clone()
                .ok_or_else(|| anyhow!("{what} request cannot be replayed"))?;
            let response = pending
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await
                .with_context(|| format!("{what} request failed"))?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt > MAX_RETRIES {
                    return Err(anyhow!("{what} rate limited after {MAX_RETRIES} retries"));
                }
                let wait = backoff_delay(attempt, response.headers().get("retry-after"));
                debug!(what, attempt, wait_secs = wait.as_secs(), "rate limited; backing off");
                sleep(wait).await;
                continue;
            }
            return ensure_success(response, what).await;
        }
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.execute(request, what)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode {what} response"))
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!(
        "{what} returned error (status {status}): {}",
        api_error_message(&body)
    ))
}

/// Pulls `error.message` out of a Google API error body, falling back to the
/// raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|err| err.get("message"))
                .and_then(|msg| msg.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn backoff_delay(attempt: usize, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(value) = retry_after {
        if let Ok(text) = value.to_str() {
            if let Ok(secs) = text.parse::<u64>() {
                return Duration::from_secs(secs.max(1));
            }
        }
    }
    let capped = attempt.min(6) as u32;
    Duration::from_secs(1u64 << capped)
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!("{var} is not set"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("{var} is empty"));
    }
    Ok(value)
}
