//! Shutdown triggers.
//!
//! # Responsibilities
//! - Listen for SIGINT / Ctrl+C and SIGTERM
//! - Listen for a `shutdown` line on stdin (supervisor message channel)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A trigger that cannot be installed is logged and never fires

use std::future::pending;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Message a supervisor writes to request shutdown.
pub const SHUTDOWN_MESSAGE: &str = "shutdown";

/// Resolve with the name of the first trigger that fires.
pub async fn wait_for_shutdown() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = pending::<()>();

    let message = wait_for_message(BufReader::new(tokio::io::stdin()));

    let source = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
        _ = message => "shutdown message",
    };
    tracing::info!(source, "Shutdown signal received");
    source
}

/// Resolve when `reader` yields a shutdown line. Pending forever on EOF.
pub async fn wait_for_message<R>(reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case(SHUTDOWN_MESSAGE) {
            return;
        }
    }
    pending::<()>().await
}
