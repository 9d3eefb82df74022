//! Error kinds raised inside the alert pipeline.
//!
//! None of these is fatal at runtime: each is confined to the current poll
//! cycle, the current item or the current subscriber session.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    /// Content source unreachable or answered with an error
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Content source did not answer within the fetch timeout
    #[error("fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    /// Dedup store could not read or write its durable record
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A fetched record lacks a field an alert needs
    #[error("malformed item: {0}")]
    MalformedItem(&'static str),

    /// A send to one subscriber session failed
    #[error("delivery to session {session} failed: {reason}")]
    Delivery { session: String, reason: String },

    #[error("session already connected: {0}")]
    DuplicateSession(String),
}

impl From<sqlx::Error> for AlertError {
    fn from(e: sqlx::Error) -> Self {
        AlertError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(e: serde_json::Error) -> Self {
        AlertError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
