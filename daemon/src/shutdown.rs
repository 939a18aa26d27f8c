//! Interrupt source for a verification run.

use tokio::signal;

/// Resolves on the first SIGINT or SIGTERM.
///
/// A signal whose handler cannot be installed is logged and never fires.
pub async fn interrupted() {
    let sigint = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = sigint => tracing::info!("received SIGINT, cancelling verification"),
        () = sigterm => tracing::info!("received SIGTERM, cancelling verification"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stays_pending_without_a_signal() {
        let waited = tokio::time::timeout(Duration::from_millis(50), interrupted()).await;
        assert!(waited.is_err());
    }
}
