//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a shared `CancellationToken`; the scheduler and
//! the activation worker stop at their next await point.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn a listener that cancels the returned token on SIGINT or SIGTERM.
///
/// If no handler can be registered (restricted environments) the token is
/// still returned but only manual cancellation will stop the daemon.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();

    tokio::spawn(async move {
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGINT handler: {}", e);
                None
            }
        };

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                None
            }
        };

        let name = match (sigint, sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                    _ = child.cancelled() => return,
                }
            }
            (Some(mut int), None) => {
                tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = child.cancelled() => return,
                }
            }
            (None, Some(mut term)) => {
                tokio::select! {
                    _ = term.recv() => "SIGTERM",
                    _ = child.cancelled() => return,
                }
            }
            (None, None) => {
                warn!("No signal handlers registered - graceful shutdown disabled");
                return;
            }
        };

        info!("Received {}, initiating graceful shutdown...", name);
        child.cancel();
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_starts_live() {
        let token = shutdown_token();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_clones_share_cancellation() {
        let token = shutdown_token();
        let clone = token.clone();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), clone.cancelled())
            .await
            .unwrap();
    }
}
