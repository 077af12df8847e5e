//! Per-site pipeline compilation.
//!
//! # Data Flow
//! ```text
//! SiteDescriptor + port
//!     → content stages: static mounts → CGI gateway → proxy mounts → fallback
//!     → wrapped (innermost first) in: custom headers → basic auth
//!       → rate limit → favicon → security headers → compression → CORS
//!       → response time → request trace
//!     → CompiledPipeline { host predicate, axum Router }
//! ```
//!
//! # Design Decisions
//! - Compiled once at startup; nothing is rebuilt per request
//! - A layer or stage is present only if its option is set
//! - The host predicate sits outside the pipeline, in `routing::router`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware,
    response::Response,
    Router,
};
use tower::ServiceExt;
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, Predicate, SizeAbove},
        CompressionLayer,
    },
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::cgi::CgiGateway;
use crate::config::schema::{enabled, SiteDescriptor};
use crate::config::validation::ValidationError;
use crate::http::fallback::FallbackResponder;
use crate::http::middleware::{
    cors::create_cors_layer,
    favicon::{favicon_middleware, FaviconState},
    response_time::{response_time_middleware, ResponseTimeState},
};
use crate::http::mount;
use crate::http::proxy::{build_client, ProxyClient, ProxyMount};
use crate::http::stage::{run_chain, Stage, StageChain, StaticMount};
use crate::routing::matcher::{HostMatcher, Matcher};
use crate::security::{
    basic_auth_middleware, rate_limit_middleware, security_headers_middleware, BasicAuthState,
    RateLimiterState, SecurityHeaders,
};

/// Middleware names, outermost first, as reported by [`CompiledPipeline::layers`].
pub const LAYER_ORDER: [&str; 9] = [
    "trace",
    "response-time",
    "cors",
    "compression",
    "helmet",
    "favicon",
    "rate-limit",
    "basic-auth",
    "headers",
];

/// A site's request pipeline plus the host predicate gating it.
#[derive(Clone)]
pub struct CompiledPipeline {
    host: HostMatcher,
    label: String,
    layers: Vec<&'static str>,
    stages: Vec<String>,
    service: Router,
}

impl CompiledPipeline {
    pub fn host(&self) -> &HostMatcher {
        &self.host
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Active middleware, outermost first.
    pub fn layers(&self) -> &[&'static str] {
        &self.layers
    }

    /// Content stages in evaluation order, ending with `fallback`.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    pub fn matches(&self, req: &Request) -> bool {
        self.host.matches(req)
    }

    /// Run the request through the pipeline.
    pub async fn call(&self, req: Request) -> Response {
        match self.service.clone().oneshot(req).await {
            Ok(res) => res,
            Err(never) => match never {},
        }
    }
}

impl std::fmt::Debug for CompiledPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPipeline")
            .field("label", &self.label)
            .field("layers", &self.layers)
            .field("stages", &self.stages)
            .finish()
    }
}

/// Builds [`CompiledPipeline`]s. Holds resources shared by every site.
#[derive(Clone)]
pub struct PipelineCompiler {
    client: ProxyClient,
    cwd: PathBuf,
}

impl PipelineCompiler {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            client: build_client(),
            cwd: cwd.into(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn compile(&self, site: &SiteDescriptor, port: u16) -> Result<CompiledPipeline, ValidationError> {
        let label = format!("{}:{}", site.display_host(), port);
        let chain = self.build_chain(site, port, &label)?;
        let stages = chain
            .stages()
            .iter()
            .map(Stage::label)
            .chain(std::iter::once("fallback".to_string()))
            .collect();

        let mut router = Router::new().fallback(run_chain).with_state(Arc::new(chain));
        let mut layers = Vec::new();

        for (name, value) in &site.headers {
            let invalid = || ValidationError::InvalidHeader {
                host: site.display_host().to_string(),
                name: name.clone(),
            };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            router = router.layer(SetResponseHeaderLayer::overriding(name, value));
        }
        if !site.headers.is_empty() {
            layers.push("headers");
        }

        if let Some(opts) = &site.basic_auth {
            let state = Arc::new(BasicAuthState::new(opts));
            router = router.layer(middleware::from_fn_with_state(state, basic_auth_middleware));
            layers.push("basic-auth");
        }

        if let Some(opts) = enabled(&site.rate_limit) {
            let state = Arc::new(RateLimiterState::new(&opts));
            router = router.layer(middleware::from_fn_with_state(state, rate_limit_middleware));
            layers.push("rate-limit");
        }

        if let Some(file) = &site.favicon {
            let file = if file.is_absolute() {
                file.clone()
            } else {
                self.cwd.join(file)
            };
            tracing::info!(site = %label, path = ?file, "[favicon]");
            let state = Arc::new(FaviconState::new(file));
            router = router.layer(middleware::from_fn_with_state(state, favicon_middleware));
            layers.push("favicon");
        }

        if let Some(opts) = enabled(&site.helmet) {
            let state = Arc::new(SecurityHeaders::new(&opts));
            router = router.layer(middleware::from_fn_with_state(state, security_headers_middleware));
            layers.push("helmet");
        }

        if let Some(opts) = enabled(&site.compression) {
            let predicate = DefaultPredicate::new().and(SizeAbove::new(opts.threshold));
            router = router.layer(CompressionLayer::new().compress_when(predicate));
            layers.push("compression");
        }

        if let Some(opts) = enabled(&site.cors) {
            router = router.layer(create_cors_layer(&opts));
            layers.push("cors");
        }

        if let Some(state) = enabled(&site.response_time).and_then(|o| ResponseTimeState::new(&o)) {
            router = router.layer(middleware::from_fn_with_state(
                Arc::new(state),
                response_time_middleware,
            ));
            layers.push("response-time");
        }

        if site.logging_enabled() {
            router = router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            );
            layers.push("trace");
        }

        layers.reverse();

        let host = if site.is_wildcard() {
            HostMatcher::any()
        } else {
            HostMatcher::new(site.host_key())
        };

        tracing::info!(site = %label, layers = ?layers, "Pipeline compiled");

        Ok(CompiledPipeline {
            host,
            label,
            layers,
            stages,
            service: router,
        })
    }

    fn build_chain(&self, site: &SiteDescriptor, port: u16, label: &str) -> Result<StageChain, ValidationError> {
        let mut stages = Vec::new();

        for (prefix, dir) in mount::static_mounts(site, &self.cwd) {
            tracing::info!(site = %label, prefix = %prefix, path = ?dir, "[folder]");
            stages.push(Stage::Static(StaticMount::new(prefix, dir)));
        }

        if let Some(cgi) = &site.cgi {
            let gateway = CgiGateway::new(cgi, port, &self.cwd);
            tracing::info!(site = %label, prefix = %gateway.mount(), path = ?gateway.root(), "[cgi]");
            stages.push(Stage::Cgi(gateway));
        }

        for m in site.proxy.as_ref().map(mount::resolve).unwrap_or_default() {
            tracing::info!(site = %label, prefix = %m.prefix, upstream = %m.target, "[proxy]");
            let proxy = ProxyMount::new(m.prefix, &m.target, self.client.clone())?
                .behind_tls(site.ssl.is_some());
            stages.push(Stage::Proxy(proxy));
        }

        Ok(StageChain::new(stages, FallbackResponder::new(&site.unhandled, &self.cwd)))
    }
}

impl Default for PipelineCompiler {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
