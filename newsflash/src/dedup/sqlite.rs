use chrono::Utc;
use sqlx::SqlitePool;

use super::DedupBackend;
use crate::error::Result;

const RECORD_NAME: &str = "notified";

/// Stores the notified ids as one JSON-encoded row of `dedup_state`.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wrap `pool`, creating the `dedup_state` table if it is missing.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dedup_state (
                name TEXT PRIMARY KEY,
                ids_json TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl DedupBackend for SqliteBackend {
    async fn load(&self) -> Result<Option<Vec<String>>> {
        let row = sqlx::query_scalar::<_, String>("SELECT ids_json FROM dedup_state WHERE name = ?")
            .bind(RECORD_NAME)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, ids: &[String]) -> Result<()> {
        let ids_json = serde_json::to_string(ids)?;
        sqlx::query("INSERT OR REPLACE INTO dedup_state (name, ids_json, updated_at) VALUES (?, ?, ?)")
            .bind(RECORD_NAME)
            .bind(ids_json)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn describe(&self) -> String {
        "sqlite:dedup_state".to_string()
    }
}
