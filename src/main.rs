use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clipnotes::api::{self, AppState};
use clipnotes::config::Config;
use clipnotes::pipeline::Pipeline;
use clipnotes::store::JobStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipnotes=info,warn")),
        )
        .init();

    let matches = Command::new("clipnotes")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Video analysis pipeline: transcripts, topics, summaries, flashcards")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to listen on (overrides config)"),
        )
        .arg(
            Arg::new("jobs-dir")
                .short('j')
                .long("jobs-dir")
                .value_name("DIR")
                .help("Directory for persisted job records (overrides config)"),
        )
        .get_matches();

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("failed to load config, using defaults: {}", e);
        Config::default()
    });
    if let Some(port) = matches.get_one::<String>("port") {
        config.server.port = port.parse()?;
    }
    if let Some(dir) = matches.get_one::<String>("jobs-dir") {
        config.storage.jobs_dir = PathBuf::from(dir);
    }
    config.validate()?;

    info!("clipnotes starting");
    info!("job records: {}", config.storage.jobs_dir.display());

    let store = Arc::new(JobStore::new(config.storage.jobs_dir.clone()).await?);

    // Jobs left processing by a previous run can never finish; fail them
    // up front so pollers are not strung along.
    let stale_after = chrono::Duration::seconds(config.ingest.stale_after_secs as i64);
    let recovered = store.recover_stale(stale_after).await?;
    if recovered > 0 {
        warn!("failed {} stale jobs from a previous run", recovered);
    }

    let stats = store.stats().await;
    info!(
        "store loaded: {} jobs ({} completed, {} failed)",
        stats.total, stats.completed, stats.failed
    );

    let pipeline = Pipeline::new(config.clone(), store.clone())?;
    let state = AppState {
        pipeline,
        store,
        config: Arc::new(config),
    };

    api::serve(state).await
}
