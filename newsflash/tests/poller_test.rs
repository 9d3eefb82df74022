use common::OverflowPolicy;
use newsflash::classifier::Classifier;
use newsflash::dedup::{DedupBackend, DedupStore};
use newsflash::dispatcher::Dispatcher;
use newsflash::error::{AlertError, Result};
use newsflash::health::{HealthMonitor, PollerState};
use newsflash::item::RawArticle;
use newsflash::poller::Poller;
use newsflash::queue::DeliveryQueue;
use newsflash::sessions::ConnectionRegistry;
use newsflash::source::ContentSource;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Source that replays a fixed list of fetch results, then returns empty batches
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<RawArticle>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Vec<RawArticle>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch_batch(&self) -> Result<Vec<RawArticle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Source that never answers in time
struct HangingSource;

#[async_trait::async_trait]
impl ContentSource for HangingSource {
    async fn fetch_batch(&self) -> Result<Vec<RawArticle>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// In-memory backend counting writes
#[derive(Default)]
struct MemoryBackend {
    saved: Arc<Mutex<Option<Vec<String>>>>,
    saves: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl DedupBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Vec<String>>> {
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, ids: &[String]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.saved.lock().unwrap() = Some(ids.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn article(url: &str, title: &str, description: &str) -> RawArticle {
    RawArticle {
        url: Some(url.to_string()),
        title: Some(title.to_string()),
        description: Some(description.to_string()),
        published_at: Some("2024-05-01T12:00:00Z".to_string()),
        ..Default::default()
    }
}

struct Harness {
    poller: Poller,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ConnectionRegistry>,
    dedup: Arc<DedupStore>,
    health: Arc<HealthMonitor>,
    saves: Arc<AtomicUsize>,
}

async fn harness(source: Arc<dyn ContentSource>) -> Harness {
    harness_with_queue(source, DeliveryQueue::unbounded()).await
}

async fn harness_with_queue(source: Arc<dyn ContentSource>, queue: DeliveryQueue) -> Harness {
    let health = Arc::new(HealthMonitor::new());
    let backend = MemoryBackend::default();
    let saves = backend.saves.clone();
    let dedup = Arc::new(
        DedupStore::open(Box::new(backend), health.clone())
            .await
            .expect("open store"),
    );
    let (registry, _events) = ConnectionRegistry::new(16, health.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        queue,
        registry.clone(),
        health.clone(),
    ));
    let classifier = Classifier::new(common::DEFAULT_MARKERS).expect("markers");
    let poller = Poller::new(source, classifier, dedup.clone(), dispatcher.clone(), health.clone())
        .with_schedule(Duration::from_millis(20), Duration::from_millis(200));

    Harness {
        poller,
        dispatcher,
        registry,
        dedup,
        health,
        saves,
    }
}

#[tokio::test]
async fn test_cycle_queues_breaking_items_in_source_order() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
        article("https://news.test/a", "Breaking: storm hits city", ""),
        article("https://news.test/b", "Quarterly earnings report", "Company profits rose"),
        article("https://news.test/c", "Local fair", "Organisers issue weather alert"),
    ])]));
    let h = harness(source).await;

    let report = h.poller.run_cycle().await.expect("cycle");
    assert_eq!(report.fetched, 3);
    assert_eq!(report.breaking, 2);
    assert_eq!(report.queued, 2);
    assert_eq!(report.broadcast, 0);

    assert!(h.dedup.contains("https://news.test/a").await);
    assert!(!h.dedup.contains("https://news.test/b").await);
    assert!(h.dedup.contains("https://news.test/c").await);

    let mut sub = h.registry.on_connect("s1").expect("connect");
    h.dispatcher.handle_new_connection();
    assert_eq!(sub.try_recv().expect("first").id, "https://news.test/a");
    assert_eq!(sub.try_recv().expect("second").id, "https://news.test/c");
    assert_eq!(h.health.poller_state(), PollerState::Idle);
}

#[tokio::test]
async fn test_redelivered_id_is_skipped_and_not_persisted_again() {
    let u1 = article("https://news.test/u1", "URGENT: evacuation ordered", "details");
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![u1.clone()]), Ok(vec![u1])]));
    let h = harness(source).await;
    let mut sub = h.registry.on_connect("s1").expect("connect");

    let first = h.poller.run_cycle().await.expect("first cycle");
    assert_eq!(first.broadcast, 1);
    let saves_after_first = h.saves.load(Ordering::SeqCst);

    let second = h.poller.run_cycle().await.expect("second cycle");
    assert_eq!(second.duplicates, 1);
    assert_eq!(second.broadcast, 0);
    assert_eq!(second.queued, 0);
    assert_eq!(h.saves.load(Ordering::SeqCst), saves_after_first);

    assert_eq!(sub.try_recv().expect("delivered once").id, "https://news.test/u1");
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_duplicate_within_one_batch_is_dispatched_once() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
        article("https://news.test/x", "Breaking: first copy", ""),
        article("https://news.test/x#update", "Breaking: second copy", ""),
    ])]));
    let h = harness(source).await;

    let report = h.poller.run_cycle().await.expect("cycle");
    assert_eq!(report.queued, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(h.dispatcher.queued(), 1);
}

#[tokio::test]
async fn test_malformed_items_are_skipped_and_batch_continues() {
    let mut missing_url = article("https://unused.test", "Breaking: no link", "");
    missing_url.url = None;
    let mut missing_title = article("https://news.test/untitled", "", "urgent body");
    missing_title.title = None;

    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
        missing_url,
        missing_title,
        article("https://news.test/ok", "Exclusive: interview", ""),
    ])]));
    let h = harness(source).await;

    let report = h.poller.run_cycle().await.expect("cycle");
    assert_eq!(report.malformed, 2);
    assert_eq!(report.queued, 1);
    assert_eq!(h.health.snapshot().malformed_items, 2);
}

#[tokio::test]
async fn test_fetch_failure_commits_nothing() {
    let source = Arc::new(ScriptedSource::new(vec![Err(AlertError::Fetch(
        "connection refused".to_string(),
    ))]));
    let h = harness(source).await;

    let result = h.poller.run_cycle().await;
    assert!(matches!(result, Err(AlertError::Fetch(_))));
    assert!(h.dedup.is_empty().await);
    assert_eq!(h.dispatcher.queued(), 0);

    let snapshot = h.health.snapshot();
    assert_eq!(snapshot.fetch_failures, 1);
    assert_eq!(snapshot.cycles, 0);
    assert_eq!(snapshot.poller_state, PollerState::Idle);
}

#[tokio::test]
async fn test_fetch_timeout_abandons_cycle() {
    let h = harness(Arc::new(HangingSource)).await;

    let result = h.poller.run_cycle().await;
    assert!(matches!(result, Err(AlertError::FetchTimeout(_))));
    assert!(h.dedup.is_empty().await);
    assert_eq!(h.health.snapshot().fetch_failures, 1);
}

#[tokio::test]
async fn test_run_keeps_polling_after_failure_until_shutdown() {
    let source = Arc::new(ScriptedSource::new(vec![
        Err(AlertError::Fetch("boom".to_string())),
        Ok(vec![article("https://news.test/later", "Breaking: recovered", "")]),
    ]));
    let h = harness(source.clone()).await;
    let shutdown = Arc::new(Notify::new());

    let dedup = h.dedup.clone();
    let poller = h.poller;
    let stop = shutdown.clone();
    let handle = tokio::spawn(async move { poller.run(stop).await });

    let mut recovered = false;
    for _ in 0..100 {
        if dedup.contains("https://news.test/later").await {
            recovered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(recovered, "second cycle ran after the failed one");
    assert!(source.calls.load(Ordering::SeqCst) >= 2);

    shutdown.notify_waiters();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller stops")
        .expect("no panic");
}

#[tokio::test]
async fn test_item_rejected_by_full_queue_is_offered_again() {
    let a = article("https://news.test/a", "Breaking: first", "");
    let b = article("https://news.test/b", "Breaking: second", "");
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![a, b.clone()]), Ok(vec![b])]));
    let h = harness_with_queue(source, DeliveryQueue::bounded(1, OverflowPolicy::DropNewest)).await;

    let first = h.poller.run_cycle().await.expect("first cycle");
    assert_eq!(first.queued, 1);
    assert_eq!(first.rejected, 1);
    assert!(h.dedup.contains("https://news.test/a").await);
    assert!(!h.dedup.contains("https://news.test/b").await);

    let mut sub = h.registry.on_connect("s1").expect("connect");
    h.dispatcher.handle_new_connection();
    assert_eq!(sub.try_recv().expect("flushed").id, "https://news.test/a");

    let second = h.poller.run_cycle().await.expect("second cycle");
    assert_eq!(second.duplicates, 0);
    assert_eq!(second.broadcast, 1);
    assert!(h.dedup.contains("https://news.test/b").await);
    assert_eq!(sub.try_recv().expect("live").id, "https://news.test/b");
}
