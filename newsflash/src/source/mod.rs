use anyhow::Context;
use common::SourceConfig;

use crate::error::Result;
use crate::item::RawArticle;

pub mod newsapi;

pub use newsapi::NewsApiSource;

/// Core trait for the external content source
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch one bounded batch of articles. Failure is all-or-nothing:
    /// no partial batch is ever returned.
    async fn fetch_batch(&self) -> Result<Vec<RawArticle>>;
}

/// Build the news-search client described by `config`, reading the API key
/// from the environment variable it names.
pub fn source_from_config(config: &SourceConfig) -> anyhow::Result<NewsApiSource> {
    let api_key = std::env::var(&config.api_key_env)
        .with_context(|| format!("news API key env var '{}' not set", config.api_key_env))?;

    Ok(NewsApiSource::new(&config.api_url, api_key, &config.query)
        .with_limits(config.page_size, config.max_retries))
}
