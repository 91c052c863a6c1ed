//! Periodic refresh of the mirrored fact count.

use std::sync::Arc;
use std::time::Duration;

use fgamirror_store::{Filter, MirrorStore};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::shutdown;

/// Publishes the total number of mirrored facts on a fixed cadence.
pub struct CountWatcher {
    store: Arc<MirrorStore>,
    interval: Duration,
    count_tx: watch::Sender<usize>,
}

impl CountWatcher {
    pub fn new(store: Arc<MirrorStore>, interval: Duration) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            store,
            interval,
            count_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Recount now. On error the previous value is kept.
    pub fn refresh(&self) -> Option<usize> {
        match self.store.count_facts(&Filter::default()) {
            Ok(total) => {
                self.count_tx.send_if_modified(|current| {
                    let changed = *current != total;
                    *current = total;
                    changed
                });
                Some(total)
            }
            Err(e) => {
                warn!(error = %e, "failed to count facts");
                None
            }
        }
    }

    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(interval_secs = self.interval.as_secs(), "count watcher starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,
                _ = async { self.refresh() } => {}
            }

            tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,
                _ = sleep(self.interval) => {}
            }
        }

        debug!("count watcher stopped");
    }
}
