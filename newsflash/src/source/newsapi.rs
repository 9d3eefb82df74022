use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::ContentSource;
use crate::error::{AlertError, Result};
use crate::item::RawArticle;

/// Client for a NewsAPI-compatible search endpoint
pub struct NewsApiSource {
    api_url: String,
    api_key: String,
    query: String,
    page_size: u32,
    max_retries: u32,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    articles: Vec<RawArticle>,
    code: Option<String>,
    message: Option<String>,
}

impl NewsApiSource {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            query: query.into(),
            page_size: 20,
            max_retries: 2,
            client: Client::builder()
                .user_agent("Newsflash/0.1.0")
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_limits(mut self, page_size: u32, max_retries: u32) -> Self {
        self.page_size = page_size;
        self.max_retries = max_retries;
        self
    }

    async fn fetch_once(&self) -> std::result::Result<Vec<RawArticle>, Attempt> {
        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", self.query.as_str()),
                ("pageSize", page_size.as_str()),
                ("sortBy", "publishedAt"),
            ])
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("network error during fetch: {}", e)))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Retry(format!("server answered {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Attempt::Retry(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Client error (4xx) - likely permanent, don't retry
            let detail = serde_json::from_str::<NewsApiResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(body);
            return Err(Attempt::Fail(format!("fetch failed with status {}: {}", status, detail)));
        }

        let parsed: NewsApiResponse = serde_json::from_str(&body)
            .map_err(|e| Attempt::Fail(format!("failed to parse response: {}", e)))?;

        if parsed.status != "ok" {
            return Err(Attempt::Fail(format!(
                "source reported {}: {}",
                parsed.code.as_deref().unwrap_or("error"),
                parsed.message.as_deref().unwrap_or("no message")
            )));
        }

        Ok(parsed.articles)
    }
}

const MAX_BACKOFF_SECS: u64 = 60;

/// Delay before `attempt` (2-based): 1s, 2s, 4s... capped at a minute.
fn retry_backoff(attempt: u32) -> Duration {
    let secs = 2u64
        .checked_pow(attempt.saturating_sub(2))
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

enum Attempt {
    Retry(String),
    Fail(String),
}

#[async_trait::async_trait]
impl ContentSource for NewsApiSource {
    async fn fetch_batch(&self) -> Result<Vec<RawArticle>> {
        let attempts = self.max_retries + 1;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            if attempt > 1 {
                let backoff = retry_backoff(attempt);
                info!(url = %self.api_url, attempt, attempts, ?backoff, "retrying news fetch");
                tokio::time::sleep(backoff).await;
            }

            match self.fetch_once().await {
                Ok(articles) => {
                    debug!(url = %self.api_url, count = articles.len(), "news batch fetched");
                    return Ok(articles);
                }
                Err(Attempt::Retry(e)) => last_error = e,
                Err(Attempt::Fail(e)) => return Err(AlertError::Fetch(e)),
            }
        }

        Err(AlertError::Fetch(last_error))
    }
}
