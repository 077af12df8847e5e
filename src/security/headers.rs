//! Security response headers.
//!
//! # Responsibilities
//! - Add a fixed set of hardening headers to every response of a site
//! - Leave headers the handler already set untouched
//!
//! # Design Decisions
//! - The header set is computed once at pipeline compile time
//! - CSP can be replaced or switched off; HSTS can be switched off

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::schema::{HelmetOptions, Toggle};

pub const DEFAULT_CSP: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';\
script-src 'self';script-src-attr 'none';style-src 'self' https: 'unsafe-inline';\
upgrade-insecure-requests";

const FIXED: [(&str, &str); 10] = [
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Precomputed header set for one site.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn new(opts: &HelmetOptions) -> Self {
        let mut headers: Vec<(HeaderName, HeaderValue)> = FIXED
            .iter()
            .map(|(n, v)| (HeaderName::from_static(n), HeaderValue::from_static(v)))
            .collect();

        let csp = match &opts.content_security_policy {
            Toggle::Flag(false) => None,
            Toggle::Flag(true) => Some(DEFAULT_CSP.to_string()),
            Toggle::Options(custom) if custom.trim().is_empty() => Some(DEFAULT_CSP.to_string()),
            Toggle::Options(custom) => Some(custom.clone()),
        };
        if let Some(csp) = csp.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.push((HeaderName::from_static("content-security-policy"), csp));
        }
        if opts.hsts {
            headers.push((
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static(HSTS),
            ));
        }
        Self { headers }
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

pub async fn security_headers_middleware(
    State(state): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in &state.headers {
        headers.entry(name.clone()).or_insert_with(|| value.clone());
    }
    response
}
