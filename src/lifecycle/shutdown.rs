//! Shutdown coordination across listeners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};

/// Hard limit on how long shutdown may take.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Something that can stop accepting work and drain what it has.
pub trait Drain: Send {
    /// Name used in shutdown logs.
    fn name(&self) -> String;

    /// Stop accepting and resolve once in-flight work has finished.
    /// `deadline` is the time the caller is prepared to wait.
    fn drain(self: Box<Self>, deadline: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every listener drained.
    Clean,
    /// The deadline passed with listeners still draining.
    Forced { outstanding: usize },
}

/// Drain all listeners at once and wait for the slowest, up to `deadline`.
pub async fn coordinate(listeners: Vec<Box<dyn Drain>>, deadline: Duration) -> ShutdownOutcome {
    let outstanding = Arc::new(AtomicUsize::new(listeners.len()));
    tracing::info!(
        listeners = listeners.len(),
        deadline_ms = deadline.as_millis() as u64,
        "Shutting down"
    );

    let drains = listeners.into_iter().map(|listener| {
        let outstanding = outstanding.clone();
        let name = listener.name();
        let drained = listener.drain(deadline);
        async move {
            drained.await;
            let remaining = outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
            tracing::info!(listener = %name, remaining, "Listener drained");
        }
    });

    match tokio::time::timeout(deadline, join_all(drains)).await {
        Ok(_) => ShutdownOutcome::Clean,
        Err(_) => {
            let outstanding = outstanding.load(Ordering::Acquire);
            tracing::warn!(outstanding, "Shutdown deadline reached, forcing exit");
            ShutdownOutcome::Forced { outstanding }
        }
    }
}
