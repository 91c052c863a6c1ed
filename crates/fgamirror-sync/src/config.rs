//! Runtime knobs for the sync loops.

use std::time::Duration;

/// Cadence and batch sizes for the background loops.
///
/// Every loop runs on a fixed delay: there is no backoff, a failed cycle
/// simply waits its delay and tries again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Delay between successful change-feed polls.
    pub mirror_interval: Duration,
    /// Delay after a failed poll or apply.
    pub mirror_error_delay: Duration,
    /// Changes requested per feed page.
    pub page_size: u32,
    /// Delay between deletion sweeps.
    pub sweep_interval: Duration,
    /// Marked facts attempted per sweep.
    pub sweep_batch: usize,
    /// Run the pruner on this cadence. `None` prunes only on demand.
    pub prune_interval: Option<Duration>,
    /// Delay between total-count refreshes.
    pub count_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mirror_interval: Duration::from_secs(2),
            mirror_error_delay: Duration::from_secs(2),
            page_size: 50,
            sweep_interval: Duration::from_secs(10),
            sweep_batch: 10,
            prune_interval: None,
            count_interval: Duration::from_secs(5),
        }
    }
}
