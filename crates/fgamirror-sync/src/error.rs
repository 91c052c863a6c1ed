//! Error types for the sync loops.

use fgamirror_api::ApiError;
use fgamirror_store::StoreError;
use thiserror::Error;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote API error.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
