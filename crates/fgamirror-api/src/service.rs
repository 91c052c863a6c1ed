//! The remote capabilities the mirror depends on.

use async_trait::async_trait;

use crate::{ApiError, ChangesPage, FgaClient, TupleKey};

/// Change feed plus mutation API of the remote relationship store.
#[async_trait]
pub trait TupleService: Send + Sync {
    /// Read the next page of changes after `cursor` (from the start when `None`).
    async fn read_changes(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ChangesPage, ApiError>;

    /// Write tuples.
    async fn write(&self, tuples: &[TupleKey]) -> Result<(), ApiError>;

    /// Delete tuples. A store verdict that the request is invalid surfaces as
    /// an error for which [`ApiError::is_client_error`] holds.
    async fn delete(&self, tuples: &[TupleKey]) -> Result<(), ApiError>;
}

#[async_trait]
impl TupleService for FgaClient {
    async fn read_changes(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ChangesPage, ApiError> {
        FgaClient::read_changes(self, cursor, page_size).await
    }

    async fn write(&self, tuples: &[TupleKey]) -> Result<(), ApiError> {
        self.write_tuples(tuples).await
    }

    async fn delete(&self, tuples: &[TupleKey]) -> Result<(), ApiError> {
        self.delete_tuples(tuples).await
    }
}
