//! Error types for dataset manipulation.

use thiserror::Error;

/// Anything that can go wrong while merging daily changes into a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("diagnostic index {0} is out of range (expected 0..=5)")]
    UnknownDiagnostic(u8),
    #[error("row for '{locator}' on {daystamp} has no column {column}")]
    MissingColumn {
        daystamp: String,
        locator: String,
        column: usize,
    },
    #[error("row for '{locator}' on {daystamp} has non-integer count '{value}' in column {column}")]
    InvalidCount {
        daystamp: String,
        locator: String,
        column: usize,
        value: String,
    },
    #[error("count for '{locator}' on {daystamp} overflows in column {column}")]
    CountOverflow {
        daystamp: String,
        locator: String,
        column: usize,
    },
    #[error("invalid daystamp '{0}' (expected YYYY-MM-DD)")]
    InvalidDaystamp(String),
}
