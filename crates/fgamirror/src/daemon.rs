//! Long-running mode: mirror, reconciler, pruner and count watcher.

use std::sync::Arc;

use fgamirror_api::TupleService;
use fgamirror_sync::{ChangeMirror, CountWatcher, DeletionReconciler, SyncConfig};
use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::Context;

pub async fn run(ctx: Context, config: SyncConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    let service: Arc<dyn TupleService> = ctx.client.clone();

    let mirror = Arc::new(ChangeMirror::new(
        Arc::clone(&service),
        Arc::clone(&ctx.store),
        ctx.source.clone(),
        config.clone(),
    ));
    let reconciler = Arc::new(DeletionReconciler::new(
        Arc::clone(&service),
        Arc::clone(&ctx.store),
        config.clone(),
    ));
    let counter = Arc::new(CountWatcher::new(
        Arc::clone(&ctx.store),
        config.count_interval,
    ));

    let mirror_handle = {
        let mirror = Arc::clone(&mirror);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { mirror.run(shutdown_rx).await })
    };

    let reconciler_handle = {
        let reconciler = Arc::clone(&reconciler);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { reconciler.run(shutdown_rx).await })
    };

    let pruner_handle = match config.prune_interval {
        Some(interval) => {
            let reconciler = Arc::clone(&reconciler);
            let shutdown_rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                reconciler.run_pruner(shutdown_rx, interval).await
            }))
        }
        None => {
            info!("scheduled pruning disabled, run `fgamirror prune` to remove stale tuples");
            None
        }
    };

    let counter_handle = {
        let counter = Arc::clone(&counter);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { counter.run(shutdown_rx).await })
    };

    // Report status changes until shutdown
    let mut status_rx = mirror.subscribe();
    let mut count_rx = counter.subscribe();
    let mut main_shutdown_rx = shutdown_rx.clone();
    loop {
        tokio::select! {
            biased;

            changed = main_shutdown_rx.changed() => {
                if changed.is_err() || *main_shutdown_rx.borrow() {
                    break;
                }
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                let at = status.updated_at.map(|t| t.to_rfc3339());
                if !status.is_ok() {
                    warn!(status = %status, at = ?at, "mirror unhealthy");
                } else if status.writes + status.deletes > 0 {
                    info!(status = %status, at = ?at, "mirror progressed");
                }
            }

            changed = count_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let total = *count_rx.borrow_and_update();
                info!(total, "mirrored tuples");
            }
        }
    }

    info!("shutting down");
    let _ = shutdown_tx.send(true);

    let _ = mirror_handle.await;
    let _ = reconciler_handle.await;
    if let Some(handle) = pruner_handle {
        let _ = handle.await;
    }
    let _ = counter_handle.await;

    info!("fgamirror shut down gracefully");
    Ok(())
}
