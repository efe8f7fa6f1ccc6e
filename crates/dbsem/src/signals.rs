//! Signal handling
//!
//! SIGINT and SIGTERM cancel the token shared by the running operation, so
//! a held lock is released before the process exits.

use anyhow::{Context, Result};
use dbsem_core::CancellationToken;

/// Spawn a task that cancels `token` on the first termination signal.
pub fn cancel_on_signal(token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => tracing::info!("Received SIGINT, cancelling"),
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, cancelling"),
                () = token.cancelled() => return,
            }
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!("Received Ctrl-C, cancelling");
                        token.cancel();
                    }
                }
                () = token.cancelled() => {}
            }
        });
    }

    Ok(())
}
