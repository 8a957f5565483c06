//! IWK Import Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Bulk import of delivery orders from CSV. Each row is geocoded to its
//! taxing jurisdiction, priced with the matching composite tax rate and
//! persisted in batches.
//!
//! # Pipeline
//!
//! - **Rate limiting** ([`rate_limit`]): paces row admission
//! - **Ingestion** ([`ingestor`]): decodes rows into jobs
//! - **Enrichment** ([`worker`]): concurrent geocoding and tax lookup
//! - **Aggregation** ([`aggregator`]): batches successes for the store
//! - **Orchestration** ([`pipeline`]): wiring, cancellation and joins
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use iwk_import::config::ImportConfig;
//! use iwk_import::geocoder::GoogleGeocoder;
//! use iwk_import::pipeline::ImportPipeline;
//! use iwk_import::store::PgOrderStore;
//! use iwk_import::tax_rates::PgTaxRates;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgresql://localhost/iwk").await?;
//!     let config = ImportConfig::default();
//!
//!     let pipeline = ImportPipeline::new(
//!         config.clone(),
//!         Arc::new(GoogleGeocoder::new(
//!             "https://geocode.googleapis.com",
//!             "api-key",
//!             Duration::from_secs(10),
//!         )?),
//!         Arc::new(PgTaxRates::new(pool.clone(), config.default_tax_jurisdiction)),
//!         Arc::new(PgOrderStore::new(pool)),
//!     )?;
//!
//!     let file = tokio::fs::File::open("orders.csv").await?;
//!     let report = pipeline.run(file, &CancellationToken::new()).await;
//!     println!("{} of {} rows imported", report.succeeded(), report.rows_read);
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod geocoder;
pub mod ingestor;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod store;
pub mod tax_rates;
pub mod worker;

// Re-export commonly used types
pub use error::{PipelineError, RowError};
pub use models::{ImportJob, ImportReport, ImportResult};
pub use pipeline::ImportPipeline;
