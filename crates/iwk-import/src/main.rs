//! IWK Import - bulk order import tool

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use iwk_common::logging::{init_logging, LogConfig, LogLevel};
use iwk_import::config::Config;
use iwk_import::geocoder::GoogleGeocoder;
use iwk_import::pipeline::ImportPipeline;
use iwk_import::store::PgOrderStore;
use iwk_import::tax_rates::PgTaxRates;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "iwk-import")]
#[command(author, version, about = "Bulk import of delivery orders from CSV")]
struct Cli {
    /// CSV file of orders (id, longitude, latitude, timestamp, subtotal)
    file: PathBuf,

    /// Write the import report as JSON to this path
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Number of enrichment workers
    #[arg(long)]
    workers: Option<usize>,

    /// Orders persisted per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Rows admitted per second
    #[arg(long)]
    rate: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("iwk-import".to_string())
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = Config::load()?;
    if let Some(workers) = cli.workers {
        config.import.workers = workers;
    }
    if let Some(batch_size) = cli.batch_size {
        config.import.batch_size = batch_size;
    }
    if let Some(rate) = cli.rate {
        config.import.rate_per_second = rate;
    }
    config.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    let geocoder = GoogleGeocoder::new(
        config.geocoding.base_url.clone(),
        config.geocoding.api_key.clone(),
        config.geocoding.timeout(),
    )?;

    let pipeline = ImportPipeline::new(
        config.import.clone(),
        Arc::new(geocoder),
        Arc::new(PgTaxRates::new(pool.clone(), config.import.default_tax_jurisdiction.clone())),
        Arc::new(PgOrderStore::new(pool)),
    )?;

    let file = tokio::fs::File::open(&cli.file)
        .await
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping import");
                cancel.cancel();
            }
        }
    });

    info!(file = %cli.file.display(), "Importing orders");
    let report = pipeline.run(file, &cancel).await;

    if let Some(path) = &cli.report {
        let json = serde_json::to_vec_pretty(&report).context("Failed to serialize report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    if let Some(failure) = &report.error {
        error!(error = %failure, "Import did not complete");
        anyhow::bail!("Import did not complete: {failure}");
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Import complete"
    );
    Ok(())
}
