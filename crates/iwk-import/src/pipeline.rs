//! Import orchestration
//!
//! ```text
//! reader ─▶ RowIngestor ─(rate limit)─▶ job queue ─▶ N workers ─▶ result queue ─▶ BatchAggregator ─▶ OrderStore
//!                └──────────── parse failures ─────────────────────────┘
//! ```
//!
//! The producer and workers run as spawned tasks, the aggregator runs on the
//! calling task. Every stage watches a pipeline token derived from the
//! caller's token, so a caller cancel stops everything while an aggregator
//! abort stays local to this import.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::aggregator::BatchAggregator;
use crate::config::ImportConfig;
use crate::geocoder::Geocoder;
use crate::ingestor::RowIngestor;
use crate::models::ImportReport;
use crate::rate_limit::AdmissionLimiter;
use crate::store::OrderStore;
use crate::tax_rates::TaxRateSource;
use crate::worker::{Enricher, WorkerPool};

/// Concurrent bulk import of delivery orders
pub struct ImportPipeline {
    config: ImportConfig,
    rate: NonZeroU32,
    enricher: Arc<Enricher>,
    store: Arc<dyn OrderStore>,
}

impl ImportPipeline {
    pub fn new(
        config: ImportConfig,
        geocoder: Arc<dyn Geocoder>,
        tax_rates: Arc<dyn TaxRateSource>,
        store: Arc<dyn OrderStore>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid import configuration")?;
        let rate = NonZeroU32::new(config.rate_per_second)
            .context("Import rate must be greater than 0 rows per second")?;
        let enricher = Arc::new(Enricher::new(geocoder, tax_rates, config.required_state.clone()));

        Ok(Self {
            config,
            rate,
            enricher,
            store,
        })
    }

    /// Import every row of `reader`.
    ///
    /// Row-level failures are recorded in the report and never stop the
    /// import. A persistence failure or a cancel of `cancel` ends it early,
    /// with the cause in [`ImportReport::error`]. All spawned tasks have been
    /// joined by the time this returns.
    #[instrument(skip_all, fields(workers = self.config.workers, batch_size = self.config.batch_size))]
    pub async fn run<R>(&self, reader: R, cancel: &CancellationToken) -> ImportReport
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let token = cancel.child_token();
        let (job_tx, job_rx) = mpsc::channel(self.config.job_queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(self.config.result_queue_capacity);

        let limiter = AdmissionLimiter::per_second(self.rate);
        info!(rate_per_second = limiter.rate().get(), "Starting import");

        let ingestor = RowIngestor::new(limiter);
        let producer = tokio::spawn({
            let results = result_tx.clone();
            let token = token.clone();
            async move { ingestor.run(reader, job_tx, results, token).await }
        });

        let workers = WorkerPool::new(self.config.workers).spawn(
            Arc::clone(&self.enricher),
            Arc::new(Mutex::new(job_rx)),
            result_tx,
            token.clone(),
        );

        // Consumes the receiver; it is dropped before the joins below
        let aggregator = BatchAggregator::new(Arc::clone(&self.store), self.config.batch_size);
        let mut report = aggregator.run(result_rx, token.clone()).await;

        // Stages may still be running after an abort
        token.cancel();

        match producer.await {
            Ok(rows_read) => report.rows_read = rows_read,
            Err(e) => error!(error = %e, "Producer task failed"),
        }

        for (worker, joined) in join_all(workers).await.into_iter().enumerate() {
            match joined {
                Ok(processed) => debug!(worker, processed, "Worker joined"),
                Err(e) => error!(worker, error = %e, "Worker task failed"),
            }
        }

        info!(
            rows_read = report.rows_read,
            succeeded = report.succeeded(),
            failed = report.failed(),
            persisted = report.orders_persisted,
            complete = report.is_complete(),
            "Import finished"
        );

        report
    }
}
