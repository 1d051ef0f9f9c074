//! pointgraphd — daemon for the point-cloud DAG processing engine.
//!
//! A single binary plays two roles, distinguished by argv: invoked plainly
//! it is the daemon that loads the graph and runs the engine; re-exec'd
//! with the hidden `sensor-worker` subcommand (see [`sensor::parse_mode`])
//! it is a sensor's isolated child process instead.

use anyhow::{Context, Result};
use calibration::{CalibrationConfig, CalibrationService, ReloadTrigger};
use clap::Parser;
use engine::{Engine, EngineConfig};
use metrics::{Collector, MetricsCollector, MetricsRegistry, NullCollector};
use recording::{RecorderConfig, RecorderService};
use sensor::{parse_mode, worker};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use store::{JsonGraphStore, JsonHistoryStore, JsonRecordingStore};
use topics::TopicHub;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration file structure (pointgraph.toml).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    engine: EngineFileConfig,
    metrics: MetricsFileConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct EngineFileConfig {
    ingress_capacity: usize,
}

impl Default for EngineFileConfig {
    fn default() -> Self {
        Self { ingress_capacity: 100 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MetricsFileConfig {
    enabled: bool,
}

impl Default for MetricsFileConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl FileConfig {
    fn load(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: FileConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(FileConfig::default())
        }
    }
}

#[derive(Parser)]
#[command(name = "pointgraphd", about = "Point-cloud DAG processing daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/pointgraph.toml")]
    config: PathBuf,

    /// Root directory for persisted graph/history/recording documents and archives
    #[arg(long, default_value = "/var/lib/pointgraph")]
    data_dir: PathBuf,

    /// Log directory for text logs
    #[arg(long, default_value = "/var/log/pointgraph")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable metrics collection (overrides config file)
    #[arg(long)]
    no_metrics: bool,
}

/// Bridges calibration's "a pose changed" notification back to the engine's
/// own reload path. Calibration never touches the node registry itself; it
/// only asks the engine to reload from the graph store it just wrote.
struct EngineReload {
    engine: Arc<Engine>,
}

impl ReloadTrigger for EngineReload {
    fn request_reload(&self) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.reload_config().await {
                warn!(%error, "calibration-triggered reload failed");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Re-exec'd as a sensor worker: run the worker loop to completion on
    // this process's own stdout and never reach the daemon path below.
    let argv: Vec<String> = std::env::args().collect();
    if let Some(mode) = parse_mode(&argv[1..]) {
        worker::run(mode, std::io::stdout().lock());
        return Ok(());
    }

    let args = Args::parse();
    let _log_guard = init_logging(&args.log_dir, &args.log_level)?;

    let file_config = FileConfig::load(&args.config)?;
    info!(config = %args.config.display(), data_dir = %args.data_dir.display(), "starting pointgraphd");

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating data directory {}", args.data_dir.display()))?;

    let graph_store: Arc<dyn store::GraphStore> = Arc::new(JsonGraphStore::new(args.data_dir.join("graph.json")));
    let history_store: Arc<dyn store::HistoryStore> = Arc::new(JsonHistoryStore::new(args.data_dir.join("history")));
    let recording_store: Arc<dyn store::RecordingStore> =
        Arc::new(JsonRecordingStore::new(args.data_dir.join("recordings")));

    let hub = Arc::new(TopicHub::new());
    let recorder = Arc::new(RecorderService::new(
        RecorderConfig {
            archive_dir: args.data_dir.join("archives"),
            thumbnail_dir: args.data_dir.join("thumbnails"),
        },
        recording_store,
    ));

    let metrics_enabled = !args.no_metrics && file_config.metrics.enabled;
    let metrics: Arc<dyn MetricsCollector> = if metrics_enabled {
        Arc::new(Collector::new(Arc::new(MetricsRegistry::new())))
    } else {
        Arc::new(NullCollector)
    };
    info!(enabled = metrics_enabled, "metrics collection");

    let engine = Engine::new(
        graph_store.clone(),
        hub.clone(),
        recorder.clone(),
        metrics.clone(),
        EngineConfig { ingress_capacity: file_config.engine.ingress_capacity, ..EngineConfig::default() },
    );

    // Held for the process lifetime. The HTTP/WS surface that would call
    // trigger/accept/reject/rollback on this sits outside this workspace
    // (§1); constructing it here is what lets that layer be added later
    // without the daemon's own wiring changing shape.
    let _calibration_service = Arc::new(
        CalibrationService::new(graph_store.clone(), history_store.clone(), CalibrationConfig::default())
            .with_reload_trigger(Arc::new(EngineReload { engine: engine.clone() }) as Arc<dyn ReloadTrigger>),
    );

    let skipped = engine.load_config().context("loading graph configuration")?;
    for error in &skipped {
        warn!(%error, "node skipped during initial load");
    }
    engine.start().context("starting engine")?;

    tokio::spawn(metrics::run_broadcaster(metrics.clone(), hub.clone(), Instant::now()));

    info!("pointgraphd running");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, stopping engine");
    engine.stop().await;
    Ok(())
}

/// Initialize logging with stdout and rolling file output.
///
/// Returns a guard that must be held for the lifetime of the program to
/// ensure logs are properly flushed on shutdown.
fn init_logging(log_dir: &std::path::Path, level: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "pointgraphd.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pointgraphd={level},engine={level},sensor=info,calibration=info")));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false);
    let file_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking_file).with_ansi(false).with_target(true);

    tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).init();

    Ok(guard)
}
