//! Host-based dispatch across the sites of one port.
//!
//! # Responsibilities
//! - Hold the compiled pipelines of a port group in routing order
//! - Hand each request to the first pipeline whose host predicate matches
//! - Answer 404 when no site claims the request
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Linear scan: specific hosts come first, the wildcard last
//! - Explicit no-match response rather than a silent default

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::http::pipeline::CompiledPipeline;

#[derive(Debug, Clone)]
pub struct SiteRouter {
    port: u16,
    pipelines: Vec<CompiledPipeline>,
}

impl SiteRouter {
    /// `pipelines` must already be in routing order.
    pub fn new(port: u16, pipelines: Vec<CompiledPipeline>) -> Self {
        Self { port, pipelines }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pipelines(&self) -> &[CompiledPipeline] {
        &self.pipelines
    }

    /// First pipeline whose host predicate accepts the request.
    pub fn select(&self, req: &Request) -> Option<&CompiledPipeline> {
        self.pipelines.iter().find(|p| p.matches(req))
    }

    pub async fn dispatch(&self, req: Request) -> Response {
        match self.select(&req) {
            Some(pipeline) => pipeline.call(req).await,
            None => {
                tracing::debug!(port = self.port, host = ?req.headers().get("host"), "No site for host");
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}

/// Axum fallback handler for a port.
pub async fn dispatch(State(router): State<Arc<SiteRouter>>, req: Request) -> Response {
    router.dispatch(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{SiteDescriptor, UnhandledResponse, StatusSpec};
    use crate::http::pipeline::PipelineCompiler;
    use crate::routing::topology;
    use axum::body::{to_bytes, Body};

    fn site(host: Option<&str>, body: &str) -> SiteDescriptor {
        let mut site = SiteDescriptor {
            host: host.map(str::to_string),
            port: Some(8080),
            logging: Some(false),
            ..Default::default()
        };
        site.unhandled.insert(
            "*".into(),
            UnhandledResponse {
                status: Some(StatusSpec::Text("200".into())),
                send: Some(body.into()),
                ..Default::default()
            },
        );
        site
    }

    fn router(sites: Vec<SiteDescriptor>) -> SiteRouter {
        let groups = topology::build(sites, None).unwrap();
        let group = &groups[0];
        let compiler = PipelineCompiler::new(std::env::temp_dir());
        let pipelines = group
            .sites
            .iter()
            .map(|s| compiler.compile(s, group.port).unwrap())
            .collect();
        SiteRouter::new(group.port, pipelines)
    }

    async fn body_for(router: &SiteRouter, host: &str) -> (StatusCode, String) {
        let req = Request::get("/").header("host", host).body(Body::empty()).unwrap();
        let res = router.dispatch(req).await;
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn wildcard_declared_first_does_not_shadow_specific() {
        let router = router(vec![site(None, "default"), site(Some("a.test"), "site a")]);

        assert_eq!(body_for(&router, "a.test").await.1, "site a");
        assert_eq!(body_for(&router, "A.TEST:8080").await.1, "site a");
        assert_eq!(body_for(&router, "b.test").await.1, "default");
    }

    #[tokio::test]
    async fn unmatched_host_without_wildcard_is_404() {
        let router = router(vec![site(Some("a.test"), "site a")]);
        let (status, _) = body_for(&router, "other.test").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn no_subdomain_matching() {
        let router = router(vec![site(Some("a.test"), "site a")]);
        let (status, _) = body_for(&router, "www.a.test").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
