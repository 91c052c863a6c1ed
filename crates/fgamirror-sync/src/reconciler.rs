//! Deletion reconciler: pushes operator deletion intents to the remote store.

use std::sync::Arc;
use std::time::Duration;

use fgamirror_api::TupleService;
use fgamirror_store::MirrorStore;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{SyncConfig, SyncError, shutdown};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Remote deletes issued.
    pub attempted: usize,
    /// Deletes the remote accepted. Resolved later by the change mirror.
    pub accepted: usize,
    /// Deletes the remote rejected. Demoted to stale.
    pub rejected: usize,
    /// Deletes that failed otherwise. Left marked for the next sweep.
    pub failed: usize,
}

/// Drives `marked` intents to resolution.
///
/// An accepted delete changes nothing locally: the resulting DELETE arrives
/// through the change feed and the mirror removes the fact and its intent.
/// A rejected delete (client error) demotes the intent to `stale`, which is
/// terminal until [`prune`](Self::prune). Any other failure leaves the intent
/// `marked` and it is retried on the next sweep.
pub struct DeletionReconciler {
    service: Arc<dyn TupleService>,
    store: Arc<MirrorStore>,
    config: SyncConfig,
}

impl DeletionReconciler {
    pub fn new(service: Arc<dyn TupleService>, store: Arc<MirrorStore>, config: SyncConfig) -> Self {
        Self {
            service,
            store,
            config,
        }
    }

    /// Attempt the remote delete for up to `sweep_batch` marked facts.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, SyncError> {
        let marked = self.store.list_marked(self.config.sweep_batch)?;
        let mut report = SweepReport::default();

        for fact in marked {
            let key = fact.to_tuple_key();
            report.attempted += 1;

            match self.service.delete(std::slice::from_ref(&key)).await {
                Ok(()) => {
                    debug!(key = %fact.tuple_key, "remote accepted deletion");
                    report.accepted += 1;
                }
                Err(e) if e.is_client_error() => {
                    warn!(key = %fact.tuple_key, error = %e, "remote rejected deletion, marking stale");
                    self.store.demote_to_stale(&fact.tuple_key)?;
                    report.rejected += 1;
                }
                Err(e) => {
                    warn!(key = %fact.tuple_key, error = %e, "deletion failed, will retry");
                    report.failed += 1;
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                accepted = report.accepted,
                rejected = report.rejected,
                failed = report.failed,
                "deletion sweep finished"
            );
        }

        Ok(report)
    }

    /// Remove every stale intent and its fact.
    pub fn prune(&self) -> Result<usize, SyncError> {
        Ok(self.store.prune()?)
    }

    /// Sweep on a fixed cadence until shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            batch = self.config.sweep_batch,
            "deletion reconciler starting"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,

                result = self.sweep() => {
                    if let Err(e) = result {
                        warn!(error = %e, "deletion sweep failed");
                    }
                }
            }

            tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,
                _ = sleep(self.config.sweep_interval) => {}
            }
        }

        info!("deletion reconciler shut down gracefully");
    }

    /// Prune on a fixed cadence until shutdown.
    pub async fn run_pruner(&self, mut shutdown_rx: watch::Receiver<bool>, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "pruner starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,
                _ = sleep(interval) => {}
            }

            if let Err(e) = self.prune() {
                warn!(error = %e, "prune failed");
            }
        }

        info!("pruner shut down gracefully");
    }
}
