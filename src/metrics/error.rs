//! Counter errors

use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by counter operations
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Rejected before any store command was issued
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Reported by the store; passed through untouched
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for counter operations
pub type Result<T> = std::result::Result<T, MetricsError>;
