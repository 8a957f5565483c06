//! Error types for IWK

use thiserror::Error;

/// Result type alias for IWK operations
pub type Result<T> = std::result::Result<T, IwkError>;

/// Main error type for IWK
#[derive(Error, Debug)]
pub enum IwkError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    #[error("Invalid timestamp '{value}': expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { value: String },

    #[error("Invalid coordinate '{value}' for {axis}")]
    InvalidCoordinate { axis: &'static str, value: String },
}
