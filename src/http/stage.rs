//! Content stages of a site pipeline.
//!
//! Each stage either produces a response or hands the request on. The
//! chain runs static mounts, then the CGI gateway, then proxy mounts, and
//! ends at the fallback responder, which always answers.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::cgi::CgiGateway;
use crate::http::fallback::FallbackResponder;
use crate::http::mount::strip_mount;
use crate::http::proxy::ProxyMount;

/// Result of offering a request to one stage.
pub enum Outcome {
    /// The stage answered.
    Respond(Response),
    /// Not handled here; try the next stage.
    Next(Request),
}

/// One content stage.
pub enum Stage {
    Static(StaticMount),
    Cgi(CgiGateway),
    Proxy(ProxyMount),
}

impl Stage {
    pub async fn handle(&self, req: Request) -> Outcome {
        match self {
            Stage::Static(mount) => mount.handle(req).await,
            Stage::Cgi(gateway) => gateway.handle(req).await,
            Stage::Proxy(mount) => mount.handle(req).await,
        }
    }

    /// Short label used in startup logs.
    pub fn label(&self) -> String {
        match self {
            Stage::Static(m) => format!("static:{}", m.prefix),
            Stage::Cgi(g) => format!("cgi:{}", g.mount()),
            Stage::Proxy(p) => format!("proxy:{}", p.prefix()),
        }
    }
}

/// Ordered content stages plus the terminal fallback.
pub struct StageChain {
    stages: Vec<Stage>,
    fallback: FallbackResponder,
}

impl StageChain {
    pub fn new(stages: Vec<Stage>, fallback: FallbackResponder) -> Self {
        Self { stages, fallback }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub async fn run(&self, mut req: Request) -> Response {
        for stage in &self.stages {
            match stage.handle(req).await {
                Outcome::Respond(res) => return res,
                Outcome::Next(r) => req = r,
            }
        }
        self.fallback.respond(&req).await
    }
}

/// Axum fallback handler driving the chain.
pub async fn run_chain(State(chain): State<Arc<StageChain>>, req: Request) -> Response {
    chain.run(req).await
}

/// A directory served under a URL prefix.
pub struct StaticMount {
    prefix: String,
    dir: PathBuf,
    serve: ServeDir,
}

impl StaticMount {
    pub fn new(prefix: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            prefix: prefix.into(),
            serve: ServeDir::new(&dir),
            dir,
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    async fn handle(&self, req: Request) -> Outcome {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return Outcome::Next(req);
        }
        let Some(rest) = strip_mount(&self.prefix, req.uri().path()) else {
            return Outcome::Next(req);
        };
        let path_and_query = match req.uri().query() {
            Some(q) => format!("{rest}?{q}"),
            None => rest.to_string(),
        };
        let Ok(uri) = Uri::try_from(path_and_query) else {
            return Outcome::Next(req);
        };

        // The original request stays intact for later stages; ServeDir only
        // needs the head.
        let mut head_req = Request::new(Body::empty());
        *head_req.method_mut() = req.method().clone();
        *head_req.uri_mut() = uri;
        *head_req.version_mut() = req.version();
        *head_req.headers_mut() = req.headers().clone();

        let res = match self.serve.clone().oneshot(head_req).await {
            Ok(res) => res,
            Err(never) => match never {},
        };
        if res.status() == StatusCode::NOT_FOUND || res.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Outcome::Next(req);
        }

        let mut res = res.map(Body::new).into_response();
        if res.status().is_redirection() && self.prefix != "/" {
            // ServeDir redirects relative to the stripped path
            if let Some(location) = res
                .headers()
                .get(axum::http::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|l| l.starts_with('/'))
                .map(|l| format!("{}{}", self.prefix, l))
            {
                if let Ok(value) = location.parse() {
                    res.headers_mut().insert(axum::http::header::LOCATION, value);
                }
            }
        }
        Outcome::Respond(res)
    }
}
