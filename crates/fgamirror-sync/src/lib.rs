//! Background synchronisation between a remote tuple store and the local
//! mirror.
//!
//! - [`ChangeMirror`] tails the remote change feed into the store
//! - [`DeletionReconciler`] drives operator deletion intents to resolution
//! - [`TupleBrowser`] is the read/write facade used by the presentation layer
//! - [`CountWatcher`] keeps a periodically refreshed total
//!
//! The loops share one [`fgamirror_store::MirrorStore`] and never coordinate
//! with each other; each store mutation is its own transaction.

mod config;
mod count;
mod error;
mod mirror;
mod query;
mod reconciler;
mod shutdown;

pub use config::SyncConfig;
pub use count::CountWatcher;
pub use error::SyncError;
pub use mirror::{ChangeMirror, CycleReport, MirrorStatus};
pub use query::{PageWindow, TupleBrowser};
pub use reconciler::{DeletionReconciler, SweepReport};
