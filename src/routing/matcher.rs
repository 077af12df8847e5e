//! Request matching logic.
//!
//! # Responsibilities
//! - Match the request hostname (exact match, case-insensitive)
//! - Match the Accept header against a configured media type
//!
//! # Design Decisions
//! - Host matching ignores the port and ASCII case
//! - No wildcard sub-domain matching; the wildcard host is a separate site
//! - A request without an Accept header accepts anything

use axum::body::Body;
use axum::http::{header, Request};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Hostname of the request, from `Host` or the URI authority, without port.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().host().map(str::to_string))?;
    Some(strip_port(&raw).to_ascii_lowercase())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop anything after them
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches the request hostname; `None` matches every host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: Option<String>,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: Some(host.into().to_ascii_lowercase()),
        }
    }

    /// Matcher for the wildcard site.
    pub fn any() -> Self {
        Self { expected_host: None }
    }

    pub fn is_any(&self) -> bool {
        self.expected_host.is_none()
    }

    pub fn matches_host(&self, host: Option<&str>) -> bool {
        match (&self.expected_host, host) {
            (None, _) => true,
            (Some(expected), Some(host)) => expected.eq_ignore_ascii_case(host),
            (Some(_), None) => false,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matches_host(request_host(req).as_deref())
    }
}

/// Accept-type matcher for fallback responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptMatcher {
    /// Empty, `*` or `**` key: always matches.
    Always,
    /// A media type such as `application/json` or `text/*`.
    MediaType(String),
}

impl AcceptMatcher {
    /// Build from an `unhandled` key. Bare extensions (`json`, `html`) are
    /// expanded to their media type.
    pub fn parse(key: &str) -> Self {
        let key = key.trim();
        if key.is_empty() || key == "*" || key == "**" {
            return AcceptMatcher::Always;
        }
        if key.contains('/') {
            return AcceptMatcher::MediaType(key.to_ascii_lowercase());
        }
        let media = mime_guess::from_ext(key)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| format!("application/{}", key.to_ascii_lowercase()));
        AcceptMatcher::MediaType(media)
    }

    /// Whether an Accept header value admits this matcher's type.
    pub fn accepts(&self, accept: Option<&str>) -> bool {
        let wanted = match self {
            AcceptMatcher::Always => return true,
            AcceptMatcher::MediaType(m) => m,
        };
        let Some(accept) = accept.map(str::trim).filter(|a| !a.is_empty()) else {
            return true;
        };

        accept.split(',').any(|entry| {
            let mut params = entry.split(';');
            let range = params.next().unwrap_or_default().trim().to_ascii_lowercase();
            let refused = params.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            !refused && media_range_matches(&range, wanted)
        })
    }
}

fn media_range_matches(range: &str, wanted: &str) -> bool {
    let (Some((rt, rs)), Some((wt, ws))) = (range.split_once('/'), wanted.split_once('/')) else {
        return range == "*" || range == wanted;
    };
    let part = |a: &str, b: &str| a == "*" || b == "*" || a == b;
    part(rt, wt) && part(rs, ws)
}

impl Matcher for AcceptMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let accept = req
            .headers()
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok());
        self.accepts(accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_host(host: &str) -> Request<Body> {
        Request::builder()
            .header("Host", host)
            .body(Body::default())
            .unwrap()
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");

        assert!(matcher.matches(&with_host("example.com")));
        assert!(matcher.matches(&with_host("EXAMPLE.COM"))); // Case insensitive
        assert!(matcher.matches(&with_host("example.com:8080")));
        assert!(!matcher.matches(&with_host("other.com")));
        assert!(!matcher.matches(&with_host("sub.example.com")));
    }

    #[test]
    fn any_host_matches_everything() {
        let matcher = HostMatcher::any();
        assert!(matcher.matches(&with_host("whatever.org")));
        assert!(matcher.matches(&Request::new(Body::empty())));
    }

    #[test]
    fn host_from_uri_authority() {
        let req = Request::builder()
            .uri("http://Api.Example.com:9000/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&req).as_deref(), Some("api.example.com"));
    }

    #[test]
    fn ipv6_host_keeps_brackets() {
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("localhost"), "localhost");
    }

    #[test]
    fn accept_wildcard_keys() {
        for key in ["", "*", "**"] {
            assert_eq!(AcceptMatcher::parse(key), AcceptMatcher::Always);
        }
    }

    #[test]
    fn accept_media_types() {
        let json = AcceptMatcher::parse("application/json");
        assert!(json.accepts(Some("application/json")));
        assert!(json.accepts(Some("text/html, application/*;q=0.8")));
        assert!(json.accepts(Some("*/*")));
        assert!(json.accepts(None));
        assert!(!json.accepts(Some("text/html")));
        assert!(!json.accepts(Some("application/json;q=0")));
    }

    #[test]
    fn accept_extension_shorthand() {
        assert_eq!(
            AcceptMatcher::parse("html"),
            AcceptMatcher::MediaType("text/html".into())
        );
        assert!(AcceptMatcher::parse("json").accepts(Some("application/json")));
    }
}
