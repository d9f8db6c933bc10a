//! Error handling for the position ledger
//!
//! Defines custom error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.
//!
//! Data-quality problems (unparseable rows, missing factors, over-sells)
//! are not errors: the engine skips or clamps and logs a diagnostic.
//! These types only cover the record-ingestion boundary and caller misuse.

use thiserror::Error;

/// Core error types for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("record error: {0}")]
    RecordError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for ledger operations
pub type Result<T> = anyhow::Result<T>;
