//! Process lifecycle: load, start, wait, drain.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::config::loader::load_config;
use crate::config::validation::PORT_ENV;
use crate::http::PipelineCompiler;
use crate::lifecycle::shutdown::{coordinate, Drain, ShutdownOutcome};
use crate::lifecycle::startup::{first_stopped, notify_ready, start_all, StartupError};
use crate::routing::topology;

/// Run the server described by the config at `config_path` until `signal`
/// resolves, then drain every listener within `deadline`.
///
/// A listener whose server stops by itself also ends the run, with
/// [`StartupError::Stopped`] once the others have drained.
pub async fn run<F>(
    config_path: &Path,
    signal: F,
    deadline: Duration,
) -> Result<ShutdownOutcome, StartupError>
where
    F: Future<Output = ()>,
{
    let sites = load_config(config_path)?;
    tracing::info!(path = ?config_path, sites = sites.len(), "Configuration loaded");

    let env_port = std::env::var(PORT_ENV).ok();
    let groups = topology::build(sites, env_port.as_deref())?;
    for group in &groups {
        tracing::info!(
            port = group.port,
            sites = group.sites.len(),
            tls = group.is_tls(),
            hot_reload = group.hot_reload_enabled(),
            "Port group"
        );
    }

    let compiler = PipelineCompiler::default();
    let listeners = start_all(&groups, &compiler).await?;
    notify_ready();

    let stopped = tokio::select! {
        _ = signal => None,
        port = first_stopped(&listeners) => Some(port),
    };
    if let Some(port) = stopped {
        tracing::error!(port, "Listener stopped on its own, shutting down the rest");
    }

    let listeners = listeners
        .into_iter()
        .map(|l| Box::new(l) as Box<dyn Drain>)
        .collect();
    let outcome = coordinate(listeners, deadline).await;
    tracing::info!(?outcome, "Shutdown complete");
    match stopped {
        Some(port) => Err(StartupError::Stopped { port }),
        None => Ok(outcome),
    }
}
