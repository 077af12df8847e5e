//! Startup orchestration.
//!
//! # Responsibilities
//! - Compile every port group and load TLS material
//! - Bind every listener, then start serving
//! - Signal readiness to the supervisor
//! - Report a server that stops on its own before shutdown was asked for
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Nothing serves until every port has compiled, loaded TLS and bound
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::{tls_rustls::RustlsConfig, Handle};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::loader::ConfigError;
use crate::config::validation::ValidationError;
use crate::http::{PipelineCompiler, PortServer};
use crate::lifecycle::shutdown::Drain;
use crate::net::listener::{self, ListenerError};
use crate::net::tls::{load_tls_config, TlsError};
use crate::reload::HotReloadRegistry;
use crate::routing::topology::PortGroup;

pub const EXIT_CONFIG: i32 = 3;
pub const EXIT_PORT_IN_USE: i32 = 4;
pub const EXIT_BIND: i32 = 5;
pub const EXIT_TLS: i32 = 6;
pub const EXIT_OTHER: i32 = 1;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("TLS setup failed for port {port}: {source}")]
    Tls {
        port: u16,
        #[source]
        source: TlsError,
    },

    #[error("hot reload failed for port {port}: {source}")]
    Watch {
        port: u16,
        #[source]
        source: notify::Error,
    },

    #[error("listener on port {port} did not start")]
    NotListening { port: u16 },

    #[error("listener on port {port} stopped unexpectedly")]
    Stopped { port: u16 },
}

impl StartupError {
    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) | StartupError::Validation(_) => EXIT_CONFIG,
            StartupError::Listener(ListenerError::AddrInUse { .. }) => EXIT_PORT_IN_USE,
            StartupError::Listener(ListenerError::Bind { .. }) => EXIT_BIND,
            StartupError::Tls { .. } => EXIT_TLS,
            StartupError::Watch { .. }
            | StartupError::NotListening { .. }
            | StartupError::Stopped { .. } => EXIT_OTHER,
        }
    }
}

/// A port that is accepting connections.
pub struct RunningListener {
    port: u16,
    local_addr: SocketAddr,
    handle: Handle,
    registry: Option<Arc<HotReloadRegistry>>,
    task: JoinHandle<std::io::Result<()>>,
    exited: watch::Receiver<bool>,
}

impl RunningListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Option<&Arc<HotReloadRegistry>> {
        self.registry.as_ref()
    }

    pub fn connection_count(&self) -> usize {
        self.handle.connection_count()
    }

    /// Resolves once the server task has ended, for whatever reason.
    pub fn stopped(&self) -> impl std::future::Future<Output = u16> + Send + 'static {
        let mut exited = self.exited.clone();
        let port = self.port;
        async move {
            // A dropped sender means the task is gone too
            let _ = exited.wait_for(|done| *done).await;
            port
        }
    }
}

/// Port of the first listener whose server stops. Pending while all serve.
pub async fn first_stopped(listeners: &[RunningListener]) -> u16 {
    if listeners.is_empty() {
        return std::future::pending().await;
    }
    let waits = listeners.iter().map(|l| l.stopped().boxed());
    let (port, _, _) = futures_util::future::select_all(waits).await;
    port
}

impl Drain for RunningListener {
    fn name(&self) -> String {
        format!("port {}", self.port)
    }

    fn drain(self: Box<Self>, deadline: Duration) -> BoxFuture<'static, ()> {
        // Open server-push streams would otherwise hold the drain open
        if let Some(registry) = &self.registry {
            registry.close();
        }
        self.handle.graceful_shutdown(Some(deadline));

        let port = self.port;
        async move {
            match self.task.await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {}
                Err(e) => tracing::error!(port, error = %e, "Server task failed"),
            }
        }
        .boxed()
    }
}

struct Prepared {
    server: PortServer,
    tls: Option<RustlsConfig>,
    listener: std::net::TcpListener,
}

/// Start one listener per port group.
///
/// Every group is compiled, its TLS material loaded, and its port bound
/// before any server is spawned; an error at any step returns before
/// anything serves.
pub async fn start_all(
    groups: &[PortGroup],
    compiler: &PipelineCompiler,
) -> Result<Vec<RunningListener>, StartupError> {
    let mut servers = Vec::with_capacity(groups.len());
    for group in groups {
        let server = PortServer::compile(group, compiler)?;
        let tls = match group.tls() {
            Some(tls) => Some(
                load_tls_config(tls)
                    .await
                    .map_err(|source| StartupError::Tls {
                        port: group.port,
                        source,
                    })?,
            ),
            None => None,
        };
        servers.push((server, tls));
    }

    let mut prepared = Vec::with_capacity(servers.len());
    for (server, tls) in servers {
        let listener = listener::bind(server.port())?;
        prepared.push(Prepared {
            server,
            tls,
            listener,
        });
    }

    for p in &prepared {
        if let Some(registry) = p.server.registry() {
            registry.watch().map_err(|source| StartupError::Watch {
                port: p.server.port(),
                source,
            })?;
        }
    }

    let mut running = Vec::with_capacity(prepared.len());
    for p in prepared {
        let port = p.server.port();
        let registry = p.server.registry().cloned();
        let handle = Handle::new();
        let serve = p.server.serve(p.listener, p.tls, handle.clone());
        let (exited_tx, exited) = watch::channel(false);
        let task = tokio::spawn(async move {
            let result = serve.await;
            if let Err(e) = &result {
                tracing::error!(port, error = %e, "Server exited with error");
            }
            let _ = exited_tx.send(true);
            result
        });

        let Some(local_addr) = handle.listening().await else {
            return Err(StartupError::NotListening { port });
        };
        tracing::info!(port, address = %local_addr, "Listening");
        running.push(RunningListener {
            port,
            local_addr,
            handle,
            registry,
            task,
            exited,
        });
    }

    Ok(running)
}

/// Tell a systemd-style supervisor that the process is ready.
pub fn notify_ready() {
    tracing::info!("ready");
    let Some(path) = std::env::var_os("NOTIFY_SOCKET") else {
        return;
    };
    #[cfg(unix)]
    if let Err(e) = send_notify(&path, b"READY=1") {
        tracing::warn!(error = %e, "Failed to notify supervisor");
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(unix)]
fn send_notify(path: &std::ffi::OsStr, message: &[u8]) -> std::io::Result<()> {
    use std::os::unix::net::UnixDatagram;

    let socket = UnixDatagram::unbound()?;
    let bytes = path.as_encoded_bytes();
    if let Some(name) = bytes.strip_prefix(b"@") {
        #[cfg(target_os = "linux")]
        {
            use std::os::linux::net::SocketAddrExt;
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
            socket.send_to_addr(message, &addr)?;
            return Ok(());
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = name;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "abstract notify socket",
            ));
        }
    }
    socket.send_to(message, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{SiteDescriptor, TlsConfig};
    use crate::routing::topology;

    fn site(port: i64) -> SiteDescriptor {
        SiteDescriptor {
            port: Some(port),
            logging: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn exit_codes_are_distinct_per_class() {
        let config = StartupError::Validation(ValidationError::MixedTls { port: 1 });
        let in_use = StartupError::Listener(ListenerError::AddrInUse { port: 1 });
        let bind = StartupError::Listener(ListenerError::Bind {
            addr: "0.0.0.0:1".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        let tls = StartupError::Tls {
            port: 1,
            source: TlsError::Missing { path: "k".into() },
        };
        let codes = [
            config.exit_code(),
            in_use.exit_code(),
            bind.exit_code(),
            tls.exit_code(),
        ];
        assert_eq!(codes, [EXIT_CONFIG, EXIT_PORT_IN_USE, EXIT_BIND, EXIT_TLS]);
    }

    #[tokio::test]
    async fn port_in_use_aborts_before_serving() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let groups = topology::build(vec![site(port as i64)], None).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let err = match start_all(&groups, &PipelineCompiler::new(tmp.path())).await {
            Ok(_) => panic!("expected bind failure"),
            Err(e) => e,
        };
        assert_eq!(err.exit_code(), EXIT_PORT_IN_USE);
    }

    #[tokio::test]
    async fn missing_tls_material_fails_before_binding() {
        let tmp = tempfile::tempdir().unwrap();
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let mut tls_site = site(port as i64);
        tls_site.ssl = Some(TlsConfig {
            key: tmp.path().join("missing.key"),
            cert: tmp.path().join("missing.crt"),
            ca: None,
        });
        let groups = topology::build(vec![tls_site], None).unwrap();
        let err = match start_all(&groups, &PipelineCompiler::new(tmp.path())).await {
            Ok(_) => panic!("expected TLS failure"),
            Err(e) => e,
        };
        assert_eq!(err.exit_code(), EXIT_TLS);
        // The port was never bound
        std::net::TcpListener::bind(("0.0.0.0", port)).unwrap();
    }

    #[tokio::test]
    async fn dead_server_task_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let ports: Vec<u16> = (0..2)
            .map(|_| {
                let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
                l.local_addr().unwrap().port()
            })
            .collect();
        let sites = ports.iter().map(|&p| site(p as i64)).collect();
        let groups = topology::build(sites, None).unwrap();
        let running = start_all(&groups, &PipelineCompiler::new(tmp.path()))
            .await
            .unwrap();

        let healthy = tokio::time::timeout(Duration::from_millis(200), first_stopped(&running)).await;
        assert!(healthy.is_err(), "no listener should have stopped yet");

        let victim = running[1].port();
        running[1].task.abort();
        let port = tokio::time::timeout(Duration::from_secs(5), first_stopped(&running))
            .await
            .unwrap();
        assert_eq!(port, victim);

        for listener in running {
            Box::new(listener).drain(Duration::from_secs(1)).await;
        }
    }
}
