//! Cache-related error types

use thiserror::Error;

/// Cache operation errors
///
/// Lookups and inserts never fail; only the background sweeper has failure modes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cleanup task requires a running tokio runtime")]
    NoRuntime,

    #[error("Cleanup interval must be greater than zero")]
    InvalidInterval,
}
