//! Durable local mirror of a remote relationship store.
//!
//! Three tables back the mirror:
//!
//! - `facts`: one row per mirrored tuple, addressed by its canonical key
//! - `intents`: at most one pending deletion intent per fact (`marked` or `stale`)
//! - `cursors`: the change-feed position per remote source
//!
//! Every mutating operation runs in its own transaction, and the row-level
//! mutations are idempotent, so the change mirror, the deletion reconciler
//! and operator calls can interleave freely.

mod db;
mod error;
mod types;

pub use db::MirrorStore;
pub use error::StoreError;
pub use types::*;
