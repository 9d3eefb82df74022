/*!
common/src/lib.rs

Shared configuration types and DB helper functions for Newsflash.

This file provides:
- Config data structures (deserialized from TOML), every section optional
- An async loader merging a default file with an override file
- A helper to initialize an SQLite database pool
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default urgency markers, matched case-insensitively against title and body.
pub const DEFAULT_MARKERS: [&str; 4] = ["breaking", "urgent", "alert", "exclusive"];

/// Upper bound for `source.max_retries`
pub const MAX_SOURCE_RETRIES: u32 = 10;

/// Polling schedule for the content source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between two poll cycles
    pub interval_seconds: u64,
    /// Upper bound for one fetch, retries included
    pub fetch_timeout_seconds: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 20,
            fetch_timeout_seconds: 8,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Urgency classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Ordered list of case-insensitive patterns (regular expressions)
    pub markers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// News-search API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub query: String,
    /// Maximum number of articles requested per cycle
    pub page_size: u32,
    pub max_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://newsapi.org/v2/everything".to_string(),
            api_key_env: "NEWS_API_KEY".to_string(),
            query: "breaking".to_string(),
            page_size: 20,
            max_retries: 2,
        }
    }
}

/// Which durable backend holds the set of already-notified ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON file path or SQLite database path depending on `backend`
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            path: "data/notified.json".to_string(),
        }
    }
}

/// What to do when a bounded delivery queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// None keeps the queue unbounded
    pub max_len: Option<usize>,
    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Per-subscriber outbound channel capacity
    pub buffer: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Put flushed items that reached no subscriber back at the head of the queue
    pub requeue_undelivered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller: PollerConfig,
    pub classifier: ClassifierConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub sessions: SessionsConfig,
    pub dispatch: DispatchConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    /// Missing files and missing sections fall back to built-in defaults.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_seconds == 0 {
            bail!("poller.interval_seconds must be greater than zero");
        }
        if self.poller.fetch_timeout_seconds == 0 {
            bail!("poller.fetch_timeout_seconds must be greater than zero");
        }
        if self.source.page_size == 0 {
            bail!("source.page_size must be greater than zero");
        }
        if self.source.max_retries > MAX_SOURCE_RETRIES {
            bail!("source.max_retries must be at most {}", MAX_SOURCE_RETRIES);
        }
        if self.classifier.markers.is_empty() {
            bail!("classifier.markers must contain at least one pattern");
        }
        for marker in &self.classifier.markers {
            regex::Regex::new(marker)
                .with_context(|| format!("invalid urgency marker pattern: {:?}", marker))?;
        }
        if self.queue.max_len == Some(0) {
            bail!("queue.max_len must be greater than zero when set");
        }
        if self.sessions.buffer == 0 {
            bail!("sessions.buffer must be greater than zero");
        }
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary and return a configured
/// `SqlitePool` in WAL mode. The pool is kept small: the only writer is the dedup store.
///
/// Example:
///   let pool = init_db_pool("data/newsflash.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
