//! Transit Position Ingest - Main Entry Point

use ingestd::{init_logging, init_metrics, run, Settings};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== Transit Ingest v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Polling {} into {}",
        settings.feed.url, settings.storage.database_path
    );

    init_metrics(&settings.metrics)?;

    let report = run(settings)?;

    info!(
        "Shutdown complete: {} polls, {} pushed, {} committed in {} batches",
        report.producer.polls,
        report.producer.pushed,
        report.consumer.committed,
        report.consumer.commits
    );
    Ok(())
}
