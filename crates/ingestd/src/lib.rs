//! Transit Position Ingest Daemon
//!
//! Settings, logging and metrics bootstrap plus the signal-driven run loop
//! around the ingest pipeline.

use anyhow::{anyhow, Context};
use gtfs_feed::{GtfsRealtimeDecoder, HttpFeedClient, DEFAULT_FEED_URL};
use ingest_pipeline::{Pipeline, PipelineConfig, PipelineReport, RunningPipeline};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use storage::SqliteRepository;
use tokio::sync::oneshot;
use tracing::{info, warn, Level};

/// Settings file used when `INGESTD_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "ingestd.toml";

/// Environment variable prefix for overrides (`INGESTD_FEED__URL=...`)
const ENV_PREFIX: &str = "INGESTD";

/// Feed endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// GTFS-realtime vehicle positions URL
    pub url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database file
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "vehicle_positions.db".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// One of trace, debug, info, warn, error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Prometheus scrape listener, e.g. "0.0.0.0:9100". Disabled when unset.
    pub listen_addr: Option<String>,
}

/// Daemon settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub feed: FeedSettings,
    pub storage: StorageSettings,
    pub pipeline: PipelineConfig,
    pub logging: LogSettings,
    pub metrics: MetricsSettings,
}

impl Settings {
    /// Load from `INGESTD_CONFIG` (or `ingestd.toml`) and `INGESTD_*` variables
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("INGESTD_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_with(&path, config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Layer defaults, an optional settings file and environment overrides.
    ///
    /// Nested keys use a double underscore: `INGESTD_PIPELINE__BATCH_SIZE=50`.
    pub fn load_with(path: &str, environment: config::Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings from {}", path))?
            .try_deserialize::<Settings>()
            .context("Failed to deserialize settings")?;

        settings.pipeline.validate()?;
        Ok(settings)
    }
}

/// Initialize logging
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let level = Level::from_str(&settings.level)
        .with_context(|| format!("Invalid log level {:?}", settings.level))?;

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true);

    match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Install the Prometheus exporter if a listen address is configured
pub fn init_metrics(settings: &MetricsSettings) -> anyhow::Result<()> {
    let Some(addr) = settings.listen_addr.as_deref() else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid metrics listen address {:?}", addr))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Run the pipeline until SIGINT/SIGTERM, then drain and report
pub fn run(settings: Settings) -> anyhow::Result<PipelineReport> {
    let pipeline = Pipeline::new(settings.pipeline.clone())?;

    let source = HttpFeedClient::with_timeout(
        &settings.feed.url,
        Duration::from_millis(settings.feed.timeout_ms),
    )?;
    let store = SqliteRepository::open(&settings.storage.database_path)?;

    let running = pipeline.start(source, GtfsRealtimeDecoder::new(), store)?;
    supervise(running, wait_for_signal())
}

/// Wait until `shutdown_signal` resolves or the workers stop on their own
/// (a worker panic stops both), then trigger shutdown and collect the report.
///
/// Only the wait runs async; the workers stay on their own threads and are
/// joined from a helper thread that reports back through a oneshot channel.
pub fn supervise<F>(running: RunningPipeline, shutdown_signal: F) -> anyhow::Result<PipelineReport>
where
    F: Future<Output = io::Result<&'static str>>,
{
    let coordinator = running.coordinator();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            coordinator.trigger();
            running.join()?;
            return Err(e).context("Failed to build signal runtime");
        }
    };

    let (done_tx, mut done_rx) = oneshot::channel();
    let joiner = std::thread::Builder::new()
        .name("pipeline-join".to_string())
        .spawn(move || {
            let _ = done_tx.send(running.join());
        });
    let joiner = match joiner {
        Ok(handle) => handle,
        Err(e) => {
            // The pipeline went down with the closure; stop the detached workers
            coordinator.trigger();
            return Err(e).context("Failed to spawn pipeline join thread");
        }
    };

    let (signal_error, joined) = runtime.block_on(async {
        tokio::select! {
            joined = &mut done_rx => {
                warn!("Pipeline stopped without a shutdown request");
                (None, joined)
            }
            signal = shutdown_signal => {
                let signal_error = match signal {
                    Ok(name) => {
                        info!("Received {}, draining queue", name);
                        None
                    }
                    Err(e) => {
                        warn!("Failed to listen for shutdown signals: {}; shutting down", e);
                        Some(e)
                    }
                };
                coordinator.trigger();
                (signal_error, done_rx.await)
            }
        }
    });

    let _ = joiner.join();
    let report = joined.context("Pipeline join thread exited without a report")??;
    if let Some(e) = signal_error {
        return Err(e).context("Failed to listen for shutdown signals");
    }
    Ok(report)
}

async fn wait_for_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
    }
}
