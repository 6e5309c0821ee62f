//! convpipe: run the conversion pipeline with the example producer.
//!
//! Usage:
//!   convpipe [OPTIONS]
//!
//! Every option can also be set through its environment variable, e.g.
//! `STORAGE_TYPE=relational-store convpipe`. Reporter output goes to
//! stdout, logs go to stderr.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use convpipe::{
    open_repositories, Coordinator, ExampleProducer, PipelineConfig, ProducerConfig,
    StorageConfig, StorageKind,
};

/// CLI arguments for convpipe.
#[derive(Parser, Debug)]
#[command(name = "convpipe")]
#[command(about = "Concurrent ingestion pipeline for conversion records")]
#[command(version)]
struct Args {
    /// Storage backend: file, document-store or relational-store
    #[arg(long, env = "STORAGE_TYPE", default_value = "file")]
    storage: StorageKind,

    /// JSONL log for requests (file backend)
    #[arg(long, env = "REQUESTS_FILE_PATH", default_value = "data/requests.jsonl")]
    requests_file: PathBuf,

    /// JSONL log for responses (file backend)
    #[arg(long, env = "RESPONSES_FILE_PATH", default_value = "data/responses.jsonl")]
    responses_file: PathBuf,

    /// JSONL log for conversion logs (file backend)
    #[arg(long, env = "LOGS_FILE_PATH", default_value = "data/logs.jsonl")]
    logs_file: PathBuf,

    /// SQLite database (document and relational backends)
    #[arg(long, env = "SQLITE_PATH", default_value = "data/convpipe.db")]
    sqlite_path: PathBuf,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Cancel the run after this many seconds (0 disables)
    #[arg(long, env = "APP_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Example batches to produce
    #[arg(long, default_value_t = 5)]
    iterations: usize,

    /// Pause between example batches, in milliseconds
    #[arg(long, default_value_t = 500)]
    pause_ms: u64,

    /// Capacity of each queue
    #[arg(long, default_value_t = 10)]
    queue_capacity: usize,

    /// Reporter polling interval, in milliseconds
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let storage = StorageConfig {
        kind: args.storage,
        requests_path: args.requests_file,
        responses_path: args.responses_file,
        logs_path: args.logs_file,
        sqlite_path: args.sqlite_path,
    };
    let config = PipelineConfig {
        queue_capacity: args.queue_capacity,
        poll_interval: Duration::from_millis(args.poll_ms),
        run_timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
        ..PipelineConfig::default()
    };

    info!(storage = %storage.kind, "starting convpipe");
    let repos = open_repositories(&storage)
        .with_context(|| format!("failed to open {} storage", storage.kind))?;

    let (mut coordinator, ingress) = Coordinator::start(&config, repos, Box::new(io::stdout()))
        .context("failed to start pipeline")?;
    coordinator
        .watch_signals()
        .context("failed to install signal handlers")?;
    coordinator.spawn_producer(
        ingress,
        ExampleProducer::new(ProducerConfig {
            iterations: args.iterations,
            pause: Duration::from_millis(args.pause_ms),
        }),
    );

    let report = coordinator.wait().await.context("pipeline failed")?;
    info!(
        requests = report.requests.stored,
        responses = report.responses.stored,
        logs = report.logs.stored,
        reported = report.reporter.total(),
        cancelled = report.cancelled,
        "shutdown complete"
    );

    Ok(())
}
