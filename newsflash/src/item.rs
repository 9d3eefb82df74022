use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// Source block nested in a news-search article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Article record as returned by the news-search API. Every field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    pub source: Option<RawSource>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub content: Option<String>,
}

/// A fetched item ready for classification. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Stable identifier (canonical URL), the deduplication key
    pub id: String,
    pub title: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub source: Option<String>,
}

impl CandidateItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            published_at: Utc::now(),
            source: None,
        }
    }

    /// Build a candidate from a raw article. `fetched_at` stands in for a
    /// missing or unparseable publication time.
    pub fn from_raw(raw: RawArticle, fetched_at: DateTime<Utc>) -> Result<Self> {
        let id = raw
            .url
            .as_deref()
            .map(canonical_id)
            .filter(|id| !id.is_empty())
            .ok_or(AlertError::MalformedItem("missing url"))?;

        let title = raw
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AlertError::MalformedItem("missing title"))?;

        let body = raw
            .description
            .filter(|d| !d.trim().is_empty())
            .or(raw.content)
            .unwrap_or_default();

        let published_at = raw
            .published_at
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(fetched_at);

        Ok(Self {
            id,
            title,
            body,
            published_at,
            source: raw.source.and_then(|s| s.name),
        })
    }
}

/// Normalize an article URL into a dedup key: trimmed, fragment removed.
/// Strings that are not absolute URLs are only trimmed.
pub fn canonical_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// JSON message pushed to subscribers for each alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl From<&CandidateItem> for AlertMessage {
    fn from(item: &CandidateItem) -> Self {
        let url = url::Url::parse(&item.id).ok().map(|u| u.to_string());
        Self {
            kind: "breaking-news".to_string(),
            id: item.id.clone(),
            title: item.title.clone(),
            url,
            source: item.source.clone(),
            published_at: item.published_at,
        }
    }
}
