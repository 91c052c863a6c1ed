//! Client for an OpenFGA-compatible relationship store.
//!
//! Only three capabilities of the remote store matter to the mirror:
//!
//! - **Change feed**: ordered, resumable log of tuple writes and deletes
//! - **Write**: create relationship tuples
//! - **Delete**: remove relationship tuples, reporting whether the store
//!   rejected the request
//!
//! [`TupleService`] captures those three so the sync loops can be driven by
//! a fake in tests; [`FgaClient`] is the HTTP implementation.

mod client;
mod error;
mod service;
mod types;

pub use client::FgaClient;
pub use error::ApiError;
pub use service::TupleService;
pub use types::*;
