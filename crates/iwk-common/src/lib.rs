//! IWK Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the IWK order services.
//!
//! # Overview
//!
//! This crate provides common functionality used across all IWK workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Types**: Orders, jurisdictions, tax breakdowns and the money arithmetic on them
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use iwk_common::types::{compute_tax, parse_amount};
//!
//! fn main() -> iwk_common::Result<()> {
//!     let subtotal = parse_amount("120.00")?;
//!     let rate = parse_amount("0.08875")?;
//!     let (tax, total) = compute_tax(&subtotal, &rate);
//!     assert_eq!(tax.to_string(), "10.65");
//!     assert_eq!(total.to_string(), "130.65");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{IwkError, Result};
