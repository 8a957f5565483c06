//! Error types for the import pipeline
//!
//! [`RowError`] is a per-row outcome and never stops an import.
//! [`PipelineError`] is terminal: it ends the import and is carried on the
//! [`ImportReport`](crate::models::ImportReport).

use thiserror::Error;

/// Why a single row could not be turned into an order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("geocoding failed: {0}")]
    Geocoding(String),

    #[error("outside service area: delivery point resolves to '{state}', only '{required}' is served")]
    OutsideServiceArea { state: String, required: String },

    #[error("tax rate lookup failed: {0}")]
    TaxRate(String),
}

impl RowError {
    /// Render a collaborator error with its full context chain
    pub(crate) fn geocoding(err: &anyhow::Error) -> Self {
        Self::Geocoding(format!("{err:#}"))
    }

    pub(crate) fn tax_rate(err: &anyhow::Error) -> Self {
        Self::TaxRate(format!("{err:#}"))
    }
}

/// Conditions that end an import early
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to persist batch of {batch_size} orders: {source:#}")]
    Persistence {
        batch_size: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("import cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
