//! HTTP server for one port.
//!
//! # Responsibilities
//! - Compile every site of a port group into a pipeline
//! - Create the port's hot-reload registry when any site asks for it
//! - Build the Axum app: hot-reload routes, then host dispatch
//! - Serve plaintext or TLS on a pre-bound listener

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};

use crate::config::validation::ValidationError;
use crate::http::pipeline::PipelineCompiler;
use crate::http::mount;
use crate::reload::{self, HotReloadRegistry};
use crate::routing::router::{dispatch, SiteRouter};
use crate::routing::topology::PortGroup;

/// Everything needed to serve one port.
pub struct PortServer {
    port: u16,
    router: Arc<SiteRouter>,
    registry: Option<Arc<HotReloadRegistry>>,
}

impl PortServer {
    /// Compile the group's pipelines. Must run inside a Tokio runtime when
    /// hot reload is enabled.
    pub fn compile(group: &PortGroup, compiler: &PipelineCompiler) -> Result<Self, ValidationError> {
        let pipelines = group
            .sites
            .iter()
            .map(|site| compiler.compile(site, group.port))
            .collect::<Result<Vec<_>, _>>()?;

        let registry = group.hot_reload_enabled().then(|| {
            let dirs = group
                .sites
                .iter()
                .flat_map(|site| mount::static_mounts(site, compiler.cwd()))
                .map(|(_, dir)| dir);
            HotReloadRegistry::new(group.port, dirs)
        });

        Ok(Self {
            port: group.port,
            router: Arc::new(SiteRouter::new(group.port, pipelines)),
            registry,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn registry(&self) -> Option<&Arc<HotReloadRegistry>> {
        self.registry.as_ref()
    }

    pub fn router(&self) -> &SiteRouter {
        &self.router
    }

    /// The port's Axum application.
    pub fn app(&self) -> Router {
        let sites = Router::new().fallback(dispatch).with_state(self.router.clone());
        match &self.registry {
            Some(registry) => reload::routes(registry.clone()).merge(sites),
            None => sites,
        }
    }

    /// Serve on `listener` until `handle` shuts the server down.
    pub async fn serve(
        self,
        listener: std::net::TcpListener,
        tls: Option<RustlsConfig>,
        handle: Handle,
    ) -> std::io::Result<()> {
        let app = self.app().into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!(port = self.port, tls = tls.is_some(), "HTTP server starting");
        let result = match tls {
            Some(config) => {
                axum_server::from_tcp_rustls(listener, config)
                    .handle(handle)
                    .serve(app)
                    .await
            }
            None => axum_server::from_tcp(listener).handle(handle).serve(app).await,
        };
        tracing::info!(port = self.port, "HTTP server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MountTree, SiteDescriptor};
    use crate::routing::topology;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn group(hot_reload: bool, folder: &str) -> PortGroup {
        let site = SiteDescriptor {
            port: Some(8080),
            hot_reload,
            folders: Some(MountTree::Leaf(folder.into())),
            ..Default::default()
        };
        topology::build(vec![site], None).unwrap().remove(0)
    }

    #[tokio::test]
    async fn hot_reload_routes_only_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let compiler = PipelineCompiler::new(tmp.path());

        let plain = PortServer::compile(&group(false, "."), &compiler).unwrap();
        assert!(plain.registry().is_none());
        let res = plain
            .app()
            .oneshot(Request::get(reload::CLIENT_SCRIPT_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let live = PortServer::compile(&group(true, "."), &compiler).unwrap();
        let registry = live.registry().unwrap();
        assert_eq!(registry.watched_dirs().len(), 1);
        let res = live
            .app()
            .oneshot(Request::get(reload::CLIENT_SCRIPT_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn site_content_served_beside_reload_routes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("page.html"), "<p>page</p>").unwrap();
        let compiler = PipelineCompiler::new(tmp.path());
        let server = PortServer::compile(&group(true, "."), &compiler).unwrap();

        let res = server
            .app()
            .oneshot(Request::get("/page.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
