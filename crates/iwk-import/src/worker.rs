//! Enrichment workers
//!
//! Each worker pulls jobs from the shared job queue, resolves the delivery
//! point's jurisdiction and tax rate, and emits one result per job. A failed
//! row produces a failed result and the worker moves on.

use std::sync::Arc;

use iwk_common::types::Order;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, Instrument};

use crate::error::RowError;
use crate::geocoder::Geocoder;
use crate::models::{ImportJob, ImportResult};
use crate::tax_rates::TaxRateSource;

/// Job queue receiver shared by every worker in a pool.
pub type SharedJobs = Arc<Mutex<mpsc::Receiver<ImportJob>>>;

/// Turns a decoded row into an order by consulting the collaborators
pub struct Enricher {
    geocoder: Arc<dyn Geocoder>,
    tax_rates: Arc<dyn TaxRateSource>,
    required_state: String,
}

impl Enricher {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        tax_rates: Arc<dyn TaxRateSource>,
        required_state: impl Into<String>,
    ) -> Self {
        Self {
            geocoder,
            tax_rates,
            required_state: required_state.into(),
        }
    }

    #[instrument(skip_all, fields(row = job.row_number))]
    pub async fn enrich(&self, job: ImportJob) -> ImportResult {
        match self.try_enrich(&job).await {
            Ok(order) => ImportResult::success(job.row_number, order),
            Err(error) => ImportResult::failure(job.row_number, error),
        }
    }

    async fn try_enrich(&self, job: &ImportJob) -> Result<Order, RowError> {
        let jurisdiction = self
            .geocoder
            .resolve_jurisdiction(job.latitude, job.longitude)
            .await
            .map_err(|e| RowError::geocoding(&e))?;

        if jurisdiction.state != self.required_state {
            return Err(RowError::OutsideServiceArea {
                state: jurisdiction.state,
                required: self.required_state.clone(),
            });
        }

        let rate = self
            .tax_rates
            .lookup_rate(&jurisdiction)
            .await
            .map_err(|e| RowError::tax_rate(&e))?;

        Ok(Order::new(
            job.latitude,
            job.longitude,
            job.subtotal.clone(),
            rate,
            jurisdiction,
            job.timestamp,
        ))
    }
}

/// Fixed-size set of enrichment tasks
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Start the workers. Each holds its own clone of `results`, so the
    /// result queue closes once every worker has exited and the caller has
    /// dropped any remaining senders.
    ///
    /// Every handle resolves to the number of jobs that worker processed.
    pub fn spawn(
        &self,
        enricher: Arc<Enricher>,
        jobs: SharedJobs,
        results: mpsc::Sender<ImportResult>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<usize>> {
        (0..self.size)
            .map(|worker| {
                let task = run_worker(
                    Arc::clone(&enricher),
                    Arc::clone(&jobs),
                    results.clone(),
                    cancel.clone(),
                );
                tokio::spawn(task.instrument(tracing::debug_span!("worker", worker)))
            })
            .collect()
    }
}

async fn run_worker(
    enricher: Arc<Enricher>,
    jobs: SharedJobs,
    results: mpsc::Sender<ImportResult>,
    cancel: CancellationToken,
) -> usize {
    let mut processed = 0;

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = next_job(&jobs) => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = enricher.enrich(job) => result,
        };

        processed += 1;
        if let Some(error) = result.error() {
            debug!(row = result.row_number, %error, "Row failed");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = results.send(result) => {
                if sent.is_err() {
                    break;
                }
            },
        }
    }

    debug!(processed, "Worker finished");
    processed
}

/// The lock is held only while waiting for the next job
async fn next_job(jobs: &SharedJobs) -> Option<ImportJob> {
    jobs.lock().await.recv().await
}
