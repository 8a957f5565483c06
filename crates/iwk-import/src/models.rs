//! Data carried between pipeline stages

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use iwk_common::types::Order;
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{PipelineError, RowError};

/// Row number of the first data row; the header occupies row 1.
pub const FIRST_DATA_ROW: u64 = 2;

/// A decoded row waiting for enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct ImportJob {
    pub row_number: u64,
    pub longitude: f64,
    pub latitude: f64,
    pub subtotal: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a single input row
///
/// Serializes as `{rowNumber, success, error?, order?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportResult {
    pub row_number: u64,
    pub outcome: Result<Order, RowError>,
}

impl ImportResult {
    pub fn success(row_number: u64, order: Order) -> Self {
        Self {
            row_number,
            outcome: Ok(order),
        }
    }

    pub fn failure(row_number: u64, error: RowError) -> Self {
        Self {
            row_number,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&RowError> {
        self.outcome.as_ref().err()
    }

    pub fn order(&self) -> Option<&Order> {
        self.outcome.as_ref().ok()
    }
}

impl Serialize for ImportResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ImportResult", 3)?;
        state.serialize_field("rowNumber", &self.row_number)?;
        state.serialize_field("success", &self.is_success())?;
        match &self.outcome {
            Ok(order) => state.serialize_field("order", order)?,
            Err(error) => state.serialize_field("error", &error.to_string())?,
        }
        state.end()
    }
}

/// Everything the aggregator observed during one import
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Results in the order they reached the aggregator
    pub results: Vec<ImportResult>,
    /// Set when the import ended early
    pub error: Option<PipelineError>,
    pub batches_flushed: usize,
    pub orders_persisted: usize,
    /// Data rows the producer read, filled in once it has been joined
    pub rows_read: u64,
}

impl ImportReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

impl Serialize for ImportReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ImportReport", 7)?;
        state.serialize_field("rowsRead", &self.rows_read)?;
        state.serialize_field("succeeded", &self.succeeded())?;
        state.serialize_field("failed", &self.failed())?;
        state.serialize_field("batchesFlushed", &self.batches_flushed)?;
        state.serialize_field("ordersPersisted", &self.orders_persisted)?;
        state.serialize_field("error", &self.error.as_ref().map(|e| e.to_string()))?;
        state.serialize_field("results", &self.results)?;
        state.end()
    }
}
