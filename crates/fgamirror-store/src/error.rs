//! Error types for the mirror store.

use thiserror::Error;

/// Errors that can occur in mirror store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error. Any transaction in flight has been rolled back.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
