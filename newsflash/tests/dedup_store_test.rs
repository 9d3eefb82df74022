use newsflash::dedup::{DedupBackend, DedupStore, JsonFileBackend, SqliteBackend};
use newsflash::error::{AlertError, Result};
use newsflash::health::HealthMonitor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend that accepts loads but refuses every write
struct ReadOnlyBackend {
    saves: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl DedupBackend for ReadOnlyBackend {
    async fn load(&self) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    async fn save(&self, _ids: &[String]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(AlertError::Persistence("disk full".to_string()))
    }

    fn describe(&self) -> String {
        "read-only".to_string()
    }
}

#[tokio::test]
async fn test_json_restart_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notified.json");
    tokio::fs::write(&path, r#"["u1"]"#).await.expect("seed file");

    let store = DedupStore::open(Box::new(JsonFileBackend::new(&path)), Arc::new(HealthMonitor::new()))
        .await
        .expect("open store");

    assert!(store.contains("u1").await);
    assert!(!store.contains("u2").await);
}

#[tokio::test]
async fn test_json_absent_record_starts_empty_and_is_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state").join("notified.json");

    let store = DedupStore::open(Box::new(JsonFileBackend::new(&path)), Arc::new(HealthMonitor::new()))
        .await
        .expect("open store");

    assert!(store.is_empty().await);
    let persisted = tokio::fs::read_to_string(&path).await.expect("record created");
    assert_eq!(persisted, "[]");
}

#[tokio::test]
async fn test_json_mark_delivered_persists_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notified.json");
    let health = Arc::new(HealthMonitor::new());

    {
        let store = DedupStore::open(Box::new(JsonFileBackend::new(&path)), health.clone())
            .await
            .expect("open store");
        assert!(store.mark_delivered("https://news.test/b").await);
        assert!(store.mark_delivered("https://news.test/a").await);
        assert!(!store.mark_delivered("https://news.test/b").await);
        assert_eq!(store.len().await, 2);
    }

    let persisted: Vec<String> =
        serde_json::from_str(&tokio::fs::read_to_string(&path).await.expect("read")).expect("json");
    assert_eq!(persisted, vec!["https://news.test/b", "https://news.test/a"]);

    // Reopen: state survives the restart
    let store = DedupStore::open(Box::new(JsonFileBackend::new(&path)), health.clone())
        .await
        .expect("reopen store");
    assert!(store.contains("https://news.test/a").await);
    assert!(store.contains("https://news.test/b").await);
    assert!(health.is_healthy());
}

#[tokio::test]
async fn test_json_corrupt_record_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notified.json");
    tokio::fs::write(&path, "{not json").await.expect("seed file");

    let result = DedupStore::open(Box::new(JsonFileBackend::new(&path)), Arc::new(HealthMonitor::new())).await;
    assert!(matches!(result, Err(AlertError::Persistence(_))));
}

#[tokio::test]
async fn test_persistence_failure_is_not_fatal() {
    let saves = Arc::new(AtomicUsize::new(0));
    let health = Arc::new(HealthMonitor::new());
    let store = DedupStore::open(Box::new(ReadOnlyBackend { saves: saves.clone() }), health.clone())
        .await
        .expect("open succeeds even when the record cannot be created");

    assert!(!health.is_healthy());

    assert!(store.mark_delivered("u1").await);
    assert!(store.contains("u1").await);
    // Already known: no second write attempt
    assert!(!store.mark_delivered("u1").await);
    assert_eq!(saves.load(Ordering::SeqCst), 2);

    let snapshot = health.snapshot();
    assert_eq!(snapshot.persistence_failures, 2);
    let last = snapshot.last_persistence_error.expect("error recorded");
    assert!(last.message.contains("disk full"));
}

#[tokio::test]
async fn test_sqlite_restart_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("newsflash.db").to_string_lossy().to_string();

    {
        let pool = common::init_db_pool(&db_path).await.expect("init pool");
        let backend = SqliteBackend::new(pool).await.expect("schema");
        let store = DedupStore::open(Box::new(backend), Arc::new(HealthMonitor::new()))
            .await
            .expect("open store");
        assert!(store.is_empty().await);
        store.mark_delivered("u1").await;
    }

    let pool = common::init_db_pool(&db_path).await.expect("reopen pool");
    let backend = SqliteBackend::new(pool.clone()).await.expect("schema");
    let store = DedupStore::open(Box::new(backend), Arc::new(HealthMonitor::new()))
        .await
        .expect("reopen store");
    assert!(store.contains("u1").await);
    assert!(!store.contains("u2").await);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dedup_state")
        .fetch_one(&pool)
        .await
        .expect("count rows");
    assert_eq!(rows, 1, "the set is a single durable record");
}
