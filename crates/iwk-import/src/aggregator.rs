//! Single consumer of results: records outcomes and flushes batches

use std::sync::Arc;

use iwk_common::types::Order;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::PipelineError;
use crate::models::{ImportReport, ImportResult};
use crate::store::OrderStore;

/// Accumulates successful orders and persists them in bounded batches
pub struct BatchAggregator {
    store: Arc<dyn OrderStore>,
    batch_size: usize,
}

impl BatchAggregator {
    pub fn new(store: Arc<dyn OrderStore>, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// Consume `results` until every sender is gone.
    ///
    /// A failed flush cancels `cancel` and returns at once with the report
    /// so far; the failed batch is not retried. If `cancel` fires from
    /// outside before the queue closes, whatever the stopping stages still
    /// deliver is recorded and flushed, and the report ends with
    /// [`PipelineError::Cancelled`]. A cancel after the queue has closed
    /// leaves the report complete.
    #[instrument(skip_all, fields(batch_size = self.batch_size))]
    pub async fn run(
        &self,
        mut results: mpsc::Receiver<ImportResult>,
        cancel: CancellationToken,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        let mut pending: Vec<Order> = Vec::with_capacity(self.batch_size);
        // Set only when the cancel lands while results are still arriving
        let mut interrupted = false;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !interrupted => {
                    interrupted = true;
                    continue;
                },
                result = results.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            match result.order() {
                Some(order) => pending.push(order.clone()),
                None => {
                    if let Some(error) = result.error() {
                        warn!(row = result.row_number, %error, "Row failed");
                    }
                },
            }
            report.results.push(result);

            if pending.len() >= self.batch_size {
                if let Err(error) = self.flush(&mut pending, &mut report).await {
                    report.error = Some(error);
                    cancel.cancel();
                    return report;
                }
            }
        }

        // Channel closed: every stage has stopped
        if let Err(error) = self.flush(&mut pending, &mut report).await {
            report.error = Some(error);
            return report;
        }

        if interrupted {
            warn!(received = report.results.len(), "Import cancelled");
            report.error = Some(PipelineError::Cancelled);
        } else {
            info!(
                received = report.results.len(),
                batches = report.batches_flushed,
                persisted = report.orders_persisted,
                "All results aggregated"
            );
        }

        report
    }

    /// Persist and clear `pending`; no store call when it is empty
    async fn flush(
        &self,
        pending: &mut Vec<Order>,
        report: &mut ImportReport,
    ) -> Result<(), PipelineError> {
        if pending.is_empty() {
            return Ok(());
        }

        let batch_size = pending.len();
        match self.store.create_batch(pending).await {
            Ok(()) => {
                report.batches_flushed += 1;
                report.orders_persisted += batch_size;
                info!(batch_size, "Flushed order batch");
                pending.clear();
                Ok(())
            },
            Err(source) => {
                error!(batch_size, error = %format!("{source:#}"), "Failed to persist order batch");
                Err(PipelineError::Persistence { batch_size, source })
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::RowError;
    use anyhow::Result;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use iwk_common::types::{Jurisdiction, TaxBreakdown, TaxRate};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<usize>>,
        fail: bool,
        cancel_on_write: Option<CancellationToken>,
    }

    #[async_trait]
    impl OrderStore for RecordingStore {
        async fn create_batch(&self, orders: &[Order]) -> Result<()> {
            self.calls.lock().unwrap().push(orders.len());
            if let Some(cancel) = &self.cancel_on_write {
                cancel.cancel();
            }
            if self.fail {
                anyhow::bail!("disk full");
            }
            Ok(())
        }
    }

    fn success(row: u64) -> ImportResult {
        let rate = TaxRate {
            composite: BigDecimal::from(0),
            breakdown: TaxBreakdown::default(),
        };
        let order = Order::new(
            40.7,
            -74.0,
            BigDecimal::from(10),
            rate,
            Jurisdiction::default(),
            Utc::now(),
        );
        ImportResult::success(row, order)
    }

    async fn aggregate(
        store: Arc<RecordingStore>,
        batch_size: usize,
        results: Vec<ImportResult>,
    ) -> (ImportReport, CancellationToken) {
        let (tx, rx) = mpsc::channel(results.len().max(1));
        for result in results {
            tx.send(result).await.unwrap();
        }
        drop(tx);

        let cancel = CancellationToken::new();
        let report = BatchAggregator::new(store, batch_size)
            .run(rx, cancel.clone())
            .await;
        (report, cancel)
    }

    #[tokio::test]
    async fn test_flush_at_threshold_and_remainder() {
        let store = Arc::new(RecordingStore::default());
        let results = (2..9).map(success).collect();

        let (report, _) = aggregate(store.clone(), 3, results).await;

        assert_eq!(*store.calls.lock().unwrap(), vec![3, 3, 1]);
        assert_eq!(report.batches_flushed, 3);
        assert_eq!(report.orders_persisted, 7);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_recorded_but_not_stored() {
        let store = Arc::new(RecordingStore::default());
        let results = vec![
            success(2),
            ImportResult::failure(3, RowError::Parse("bad".into())),
            ImportResult::failure(4, RowError::Geocoding("timeout".into())),
        ];

        let (report, _) = aggregate(store.clone(), 500, results).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(*store.calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_no_store_call_without_successes() {
        let store = Arc::new(RecordingStore::default());
        let results = vec![ImportResult::failure(2, RowError::Parse("bad".into()))];

        let (report, _) = aggregate(store.clone(), 500, results).await;

        assert!(store.calls.lock().unwrap().is_empty());
        assert_eq!(report.batches_flushed, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_cancels_pipeline() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let results = (2..8).map(success).collect();

        let (report, cancel) = aggregate(store.clone(), 2, results).await;

        assert!(cancel.is_cancelled());
        assert!(matches!(
            report.error,
            Some(PipelineError::Persistence { batch_size: 2, .. })
        ));
        assert_eq!(report.results.len(), 2);
        assert_eq!(*store.calls.lock().unwrap(), vec![2]);
        assert_eq!(report.orders_persisted, 0);
    }

    #[tokio::test]
    async fn test_cancel_while_receiving_reports_cancelled() {
        let store = Arc::new(RecordingStore::default());
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let aggregator = tokio::spawn({
            let store = store.clone();
            let cancel = cancel.clone();
            async move { BatchAggregator::new(store, 10).run(rx, cancel).await }
        });

        tx.send(success(2)).await.unwrap();
        cancel.cancel();
        tokio::task::yield_now().await;
        tx.send(success(3)).await.unwrap();
        drop(tx);

        let report = aggregator.await.unwrap();
        assert!(matches!(report.error, Some(PipelineError::Cancelled)));
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.orders_persisted, 2);
        assert_eq!(*store.calls.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_cancel_after_queue_closed_keeps_report_complete() {
        let cancel = CancellationToken::new();
        let store = Arc::new(RecordingStore {
            cancel_on_write: Some(cancel.clone()),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(4);
        for row in 2..5 {
            tx.send(success(row)).await.unwrap();
        }
        drop(tx);

        // The cancel fires during the final flush, after every result arrived
        let report = BatchAggregator::new(store.clone(), 10)
            .run(rx, cancel.clone())
            .await;

        assert!(cancel.is_cancelled());
        assert!(report.error.is_none());
        assert!(report.is_complete());
        assert_eq!(report.orders_persisted, 3);
    }
}
