/*
newsflash - single-binary main.rs
This binary starts the Rocket HTTP/WebSocket server and runs the breaking-news poller
and the dispatcher inside the same process.
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use newsflash::classifier::Classifier;
use newsflash::dedup::{backend_from_config, DedupStore};
use newsflash::dispatcher::Dispatcher;
use newsflash::health::HealthMonitor;
use newsflash::poller::Poller;
use newsflash::queue::DeliveryQueue;
use newsflash::server::{launch_rocket, AppState};
use newsflash::sessions::ConnectionRegistry;
use newsflash::source::{source_from_config, ContentSource};

#[derive(Parser, Debug)]
#[command(name = "newsflash", about = "Newsflash breaking-news server + poller")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable the poller (serve subscribers only)
    #[arg(long)]
    no_poller: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    let health = Arc::new(HealthMonitor::new());

    let backend = backend_from_config(&config.store).await?;
    let dedup = Arc::new(
        DedupStore::open(backend, health.clone())
            .await
            .context("failed to load dedup store")?,
    );

    let (registry, connection_events) = ConnectionRegistry::new(config.sessions.buffer, health.clone());

    let queue = match config.queue.max_len {
        Some(max) => DeliveryQueue::bounded(max, config.queue.overflow),
        None => DeliveryQueue::unbounded(),
    };
    let dispatcher = Arc::new(
        Dispatcher::new(queue, registry.clone(), health.clone())
            .with_requeue_undelivered(config.dispatch.requeue_undelivered),
    );

    // Prepare a shutdown notifier to signal background tasks
    let shutdown_notify = Arc::new(Notify::new());

    let dispatcher_handle = tokio::spawn(
        dispatcher
            .clone()
            .run(connection_events, shutdown_notify.clone()),
    );

    let mut poller_handle = None;
    if !args.no_poller {
        let source: Arc<dyn ContentSource> = Arc::new(source_from_config(&config.source)?);
        let classifier = Classifier::new(&config.classifier.markers).context("invalid urgency markers")?;
        let poller = Poller::new(source, classifier, dedup.clone(), dispatcher.clone(), health.clone())
            .with_schedule(config.poller.interval(), config.poller.fetch_timeout());

        info!("Spawning poller task");
        let p_shutdown = shutdown_notify.clone();
        poller_handle = Some(tokio::spawn(async move { poller.run(p_shutdown).await }));
    } else {
        info!("Poller disabled via CLI (--no-poller)");
    }

    let state = AppState {
        started_at: Utc::now(),
        registry,
        dispatcher,
        dedup,
        health,
    };

    // Launch the Rocket server (blocking until Rocket shuts down)
    if let Err(e) = launch_rocket(state, &config.server).await {
        error!(%e, "Rocket server failed");
    }

    info!("HTTP server stopped; notifying background tasks to shutdown");
    shutdown_notify.notify_waiters();

    for (name, handle) in [("poller", poller_handle), ("dispatcher", Some(dispatcher_handle))] {
        let Some(handle) = handle else { continue };
        match tokio::time::timeout(Duration::from_secs(10), handle).await {
            Ok(Ok(())) => info!(task = name, "task exited cleanly"),
            Ok(Err(join_err)) => error!(task = name, %join_err, "task panicked"),
            Err(_) => info!(task = name, "timed out waiting for task to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Merge `config.default.toml` (if present) with the explicit `--config` file,
/// or with `./config.toml` when none is given.
async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;

    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}
