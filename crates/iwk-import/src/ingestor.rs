//! Row producer: streams the CSV input and feeds the job queue

use csv_async::{AsyncReaderBuilder, StringRecord};
use governor::clock::Clock;
use iwk_common::types::{parse_amount, parse_coordinate, parse_delivery_timestamp};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::RowError;
use crate::models::{ImportJob, ImportResult, FIRST_DATA_ROW};
use crate::rate_limit::{AdmissionLimiter, TokioClock};

/// Fewest fields a data row may have.
pub const MIN_FIELDS: usize = 5;

const LONGITUDE_FIELD: usize = 1;
const LATITUDE_FIELD: usize = 2;
const TIMESTAMP_FIELD: usize = 3;
const SUBTOTAL_FIELD: usize = 4;

/// Reads rows one at a time and turns each into a job or a failed result.
///
/// Only decoded rows pass through the rate limiter; parse failures go
/// straight to the result queue.
#[derive(Debug)]
pub struct RowIngestor<C: Clock = TokioClock> {
    limiter: AdmissionLimiter<C>,
}

impl<C: Clock> RowIngestor<C> {
    pub fn new(limiter: AdmissionLimiter<C>) -> Self {
        Self { limiter }
    }
}

impl RowIngestor<TokioClock> {
    /// Stream `reader` until it is exhausted or `cancel` fires.
    ///
    /// Returns the number of data rows read, counting malformed ones. Both
    /// senders are dropped on return, which closes the job queue.
    #[instrument(skip_all)]
    pub async fn run<R>(
        &self,
        reader: R,
        jobs: mpsc::Sender<ImportJob>,
        results: mpsc::Sender<ImportResult>,
        cancel: CancellationToken,
    ) -> u64
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut csv = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .create_reader(reader);

        let mut record = StringRecord::new();
        let mut row_number = FIRST_DATA_ROW;
        let mut rows_read = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Ingestion cancelled");
                    break;
                },
                read = csv.read_record(&mut record) => read,
            };

            let current = row_number;
            match read {
                Ok(false) => break,
                Ok(true) => {
                    row_number += 1;
                    rows_read += 1;

                    match decode_record(current, &record) {
                        Ok(job) => {
                            if !self.admit(job, &jobs, &cancel).await {
                                break;
                            }
                        },
                        Err(error) => {
                            debug!(row = current, %error, "Row rejected");
                            if !emit(ImportResult::failure(current, error), &results, &cancel).await {
                                break;
                            }
                        },
                    }
                },
                Err(e) if e.is_io_error() => {
                    rows_read += 1;
                    warn!(row = current, error = %e, "Input read failed, stopping ingestion");
                    let error = RowError::Parse(format!("failed to read input: {e}"));
                    emit(ImportResult::failure(current, error), &results, &cancel).await;
                    break;
                },
                Err(e) => {
                    row_number += 1;
                    rows_read += 1;

                    let error = RowError::Parse(e.to_string());
                    debug!(row = current, %error, "Row rejected");
                    if !emit(ImportResult::failure(current, error), &results, &cancel).await {
                        break;
                    }
                },
            }
        }

        info!(rows_read, "Ingestion finished");
        rows_read
    }

    /// Wait for a permit, then enqueue. Returns `false` once the pipeline is
    /// shutting down.
    async fn admit(
        &self,
        job: ImportJob,
        jobs: &mpsc::Sender<ImportJob>,
        cancel: &CancellationToken,
    ) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = self.limiter.acquire() => {},
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = jobs.send(job) => sent.is_ok(),
        }
    }
}

async fn emit(
    result: ImportResult,
    results: &mpsc::Sender<ImportResult>,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = results.send(result) => sent.is_ok(),
    }
}

/// Decode one data row into a job.
///
/// Field 0 is ignored, then longitude, latitude, timestamp and subtotal.
pub fn decode_record(row_number: u64, record: &StringRecord) -> Result<ImportJob, RowError> {
    if record.len() < MIN_FIELDS {
        return Err(RowError::Parse(format!(
            "expected at least {MIN_FIELDS} fields, found {}",
            record.len()
        )));
    }

    let field = |index: usize| record.get(index).unwrap_or_default().trim();
    let parse_err = |e: iwk_common::IwkError| RowError::Parse(e.to_string());

    Ok(ImportJob {
        row_number,
        longitude: parse_coordinate("longitude", field(LONGITUDE_FIELD)).map_err(parse_err)?,
        latitude: parse_coordinate("latitude", field(LATITUDE_FIELD)).map_err(parse_err)?,
        timestamp: parse_delivery_timestamp(field(TIMESTAMP_FIELD)).map_err(parse_err)?,
        subtotal: parse_amount(field(SUBTOTAL_FIELD)).map_err(parse_err)?,
    })
}
