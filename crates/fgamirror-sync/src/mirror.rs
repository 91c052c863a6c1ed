//! Change mirror: tails the remote change feed into the local store.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fgamirror_api::TupleService;
use fgamirror_store::{BatchSummary, MirrorStore, SourceId};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, trace, warn};

use crate::{SyncConfig, SyncError, shutdown};

/// Latest observable state of the change mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorStatus {
    /// Whether the mirror loop is running.
    pub alive: bool,
    /// WRITEs applied by the last cycle.
    pub writes: usize,
    /// DELETEs applied by the last cycle.
    pub deletes: usize,
    /// Stored cursor after the last successful cycle.
    pub cursor: Option<String>,
    /// Error from the last cycle. `None` means it succeeded.
    pub error: Option<String>,
    /// When the last cycle finished.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MirrorStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error {
            Some(ref error) => write!(f, "error: {}", error),
            None => write!(
                f,
                "ok +{} -{} cursor {}",
                self.writes,
                self.deletes,
                self.cursor.as_deref().unwrap_or("<start>")
            ),
        }
    }
}

/// Outcome of one successful fetch/apply cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub summary: BatchSummary,
    /// Cursor stored once the batch committed.
    pub cursor: Option<String>,
}

impl CycleReport {
    pub fn changes(&self) -> usize {
        self.summary.writes + self.summary.deletes
    }
}

/// Polls the remote change feed and applies each page to the store.
///
/// A cycle is fetch then apply. The apply step is a single store
/// transaction covering every change in the page plus the cursor advance,
/// so a failed cycle leaves the cursor where it was and the next cycle
/// re-fetches the same page.
pub struct ChangeMirror {
    service: Arc<dyn TupleService>,
    store: Arc<MirrorStore>,
    source: SourceId,
    config: SyncConfig,
    status_tx: watch::Sender<MirrorStatus>,
}

impl ChangeMirror {
    pub fn new(
        service: Arc<dyn TupleService>,
        store: Arc<MirrorStore>,
        source: SourceId,
        config: SyncConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(MirrorStatus::default());
        Self {
            service,
            store,
            source,
            config,
            status_tx,
        }
    }

    /// Subscribe to status updates. Only the latest status is retained.
    pub fn subscribe(&self) -> watch::Receiver<MirrorStatus> {
        self.status_tx.subscribe()
    }

    /// Current status.
    pub fn status(&self) -> MirrorStatus {
        self.status_tx.borrow().clone()
    }

    /// Run one fetch/apply cycle and publish its status.
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let result = self.fetch_and_apply().await;
        self.publish(&result);
        result
    }

    async fn fetch_and_apply(&self) -> Result<CycleReport, SyncError> {
        let stored = self
            .store
            .get_cursor(&self.source)?
            .and_then(|cursor| cursor.continuation_token);

        let page = self
            .service
            .read_changes(stored.as_deref(), self.config.page_size)
            .await?;

        let next = page.next_cursor();
        let summary = self
            .store
            .apply_batch(&self.source, &page.changes, next, Utc::now())?;

        let report = CycleReport {
            summary,
            cursor: next.map(str::to_string).or(stored),
        };

        if report.changes() > 0 {
            info!(
                writes = summary.writes,
                deletes = summary.deletes,
                cursor = ?report.cursor,
                "applied changes"
            );
        } else {
            trace!("no new changes");
        }

        Ok(report)
    }

    fn publish(&self, result: &Result<CycleReport, SyncError>) {
        let now = Utc::now();
        self.status_tx.send_modify(|status| {
            status.updated_at = Some(now);
            match result {
                Ok(report) => {
                    status.writes = report.summary.writes;
                    status.deletes = report.summary.deletes;
                    status.cursor = report.cursor.clone();
                    status.error = None;
                }
                Err(e) => {
                    status.writes = 0;
                    status.deletes = 0;
                    status.error = Some(e.to_string());
                }
            }
        });
    }

    /// Run the mirror loop until shutdown.
    ///
    /// Feed and store failures are reported through the status channel and
    /// retried after `mirror_error_delay`; the loop itself never exits on
    /// error. An in-flight fetch is abandoned when shutdown is requested.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(source = %self.source, "change mirror starting");
        self.status_tx.send_modify(|status| status.alive = true);

        loop {
            let delay = tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,

                result = self.run_cycle() => match result {
                    Ok(_) => self.config.mirror_interval,
                    Err(e) => {
                        warn!(error = %e, "change mirror cycle failed");
                        self.config.mirror_error_delay
                    }
                },
            };

            tokio::select! {
                biased;

                _ = shutdown::requested(&mut shutdown_rx) => break,
                _ = sleep(delay) => {}
            }
        }

        self.status_tx.send_modify(|status| status.alive = false);
        info!(source = %self.source, "change mirror shut down gracefully");
    }
}
