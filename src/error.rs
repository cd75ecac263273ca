use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced while compiling or executing a metric query.
///
/// Validation variants are raised before any store access and are surfaced
/// to the caller verbatim. Numeric edge cases (zero denominators, empty
/// ranges) are never errors; they appear as `None` values in the result.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Query requests no metric")]
    MissingMetric,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<validator::ValidationErrors> for QueryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        QueryError::Validation(errors.to_string())
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
