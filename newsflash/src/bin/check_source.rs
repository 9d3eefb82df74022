//! One-shot diagnostic: fetch a batch from the configured source and show
//! how each article classifies. Nothing is dispatched or recorded.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use common::Config;
use newsflash::classifier::Classifier;
use newsflash::item::CandidateItem;
use newsflash::source::{source_from_config, ContentSource};

#[derive(Parser, Debug)]
#[command(name = "check_source", about = "Fetch once from the news source and classify the batch")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let default_path = PathBuf::from("config.default.toml");
    let override_path = args.config.unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load_with_defaults(Some(&default_path), Some(&override_path)).await?;

    let classifier = Classifier::new(&config.classifier.markers).context("invalid urgency markers")?;
    let source = source_from_config(&config.source)?;

    println!("{}", "=".repeat(60));
    println!("Source: {} (q={})", config.source.api_url, config.source.query);
    println!("{}", "=".repeat(60));

    let batch = tokio::time::timeout(config.poller.fetch_timeout(), source.fetch_batch())
        .await
        .context("fetch timed out")??;
    println!("Fetched {} articles\n", batch.len());

    let fetched_at = Utc::now();
    for (i, raw) in batch.into_iter().enumerate() {
        match CandidateItem::from_raw(raw, fetched_at) {
            Ok(item) => {
                let mark = if classifier.is_breaking(&item) { "BREAKING" } else { "-" };
                println!("{:>3}. [{}] {}", i + 1, mark, item.title);
                println!("       id: {}", item.id);
            }
            Err(e) => println!("{:>3}. [skipped] {}", i + 1, e),
        }
    }

    Ok(())
}
