use tokio::sync::watch;

/// Resolves once shutdown has been requested or the sender is gone.
pub(crate) async fn requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
