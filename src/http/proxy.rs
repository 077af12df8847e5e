//! Reverse proxy stage.
//!
//! # Responsibilities
//! - Forward requests under a mount prefix to an upstream URL
//! - Strip the mount prefix, keep the query string
//! - Rewrite `Host`, append `X-Forwarded-*`, drop hop-by-hop headers
//! - Stream both bodies without buffering
//!
//! # Design Decisions
//! - One shared HTTP client per process (connection pooling across sites)
//! - Upstream failures map to 502 Bad Gateway

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, uri::Authority, uri::Scheme, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

use crate::config::validation::ValidationError;
use crate::http::mount::strip_mount;
use crate::http::stage::Outcome;
use crate::observability::metrics;

/// Client type shared by all proxy stages.
pub type ProxyClient = Client<HttpConnector, Body>;

pub fn build_client() -> ProxyClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// An upstream mounted under a URL prefix.
pub struct ProxyMount {
    prefix: String,
    upstream: Url,
    authority: Authority,
    client: ProxyClient,
    forwarded_proto: &'static str,
}

impl ProxyMount {
    pub fn new(prefix: impl Into<String>, upstream: &str, client: ProxyClient) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidUpstream {
            url: upstream.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(upstream).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http:// upstreams are supported"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            prefix: prefix.into(),
            upstream: url,
            authority,
            client,
            forwarded_proto: "http",
        })
    }

    /// Mark the mount as served from a TLS listener, so upstreams see
    /// `X-Forwarded-Proto: https`.
    pub fn behind_tls(mut self, tls: bool) -> Self {
        self.forwarded_proto = if tls { "https" } else { "http" };
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Upstream URI for a request path (already stripped of the prefix).
    pub fn upstream_uri(&self, rest: &str, query: Option<&str>) -> Option<Uri> {
        let base = self.upstream.path().trim_end_matches('/');
        let path = if rest == "/" && !base.is_empty() {
            base.to_string()
        } else {
            format!("{base}{rest}")
        };
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .ok()
    }

    pub(crate) async fn handle(&self, req: Request) -> Outcome {
        let Some(rest) = strip_mount(&self.prefix, req.uri().path()) else {
            return Outcome::Next(req);
        };
        let Some(uri) = self.upstream_uri(rest, req.uri().query()) else {
            return Outcome::Next(req);
        };
        Outcome::Respond(self.forward(req, uri).await)
    }

    async fn forward(&self, req: Request, uri: Uri) -> Response {
        let client_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let (mut parts, body) = req.into_parts();
        let original_host = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        strip_hop_by_hop(&mut parts.headers);
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            parts.headers.insert(header::HOST, host);
        }
        if let Some(ip) = client_ip {
            append_forwarded(&mut parts.headers, "x-forwarded-for", &ip);
        }
        if let Some(host) = original_host {
            append_forwarded(&mut parts.headers, "x-forwarded-host", &host);
        }
        append_forwarded(&mut parts.headers, "x-forwarded-proto", self.forwarded_proto);

        let method = parts.method.to_string();
        parts.uri = uri.clone();
        let upstream_req = Request::from_parts(parts, body);

        tracing::debug!(upstream = %uri, "Proxying request");
        match self.client.request(upstream_req).await {
            Ok(response) => {
                metrics::record_proxy(&method, response.status().as_u16());
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(upstream = %uri, error = %e, "Upstream error");
                metrics::record_proxy(&method, 502);
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let name = HeaderName::from_static(name);
    let combined = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {value}"),
        None => value.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&combined) {
        headers.insert(name, v);
    }
}
