//! Terminal responder for requests no other stage handled.
//!
//! Entries are tried in declaration order and the first whose Accept
//! matcher admits the request answers it. Later matches are ignored.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use indexmap::IndexMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::schema::{StatusSpec, UnhandledResponse};
use crate::routing::matcher::{AcceptMatcher, Matcher};

/// Status used when an entry has no usable status.
pub const DEFAULT_UNHANDLED_STATUS: StatusCode = StatusCode::NOT_FOUND;

#[derive(Debug, Clone)]
struct FallbackEntry {
    matcher: AcceptMatcher,
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: FallbackBody,
}

#[derive(Debug, Clone)]
enum FallbackBody {
    Literal(String),
    File(PathBuf),
    Empty,
}

/// The `unhandled` block compiled into matchers and responses.
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    entries: Vec<FallbackEntry>,
}

impl FallbackResponder {
    /// Relative `file` paths resolve against `cwd`, like static folders.
    pub fn new(unhandled: &IndexMap<String, UnhandledResponse>, cwd: &Path) -> Self {
        let entries = unhandled
            .iter()
            .map(|(key, cfg)| FallbackEntry {
                matcher: AcceptMatcher::parse(key),
                status: parse_status(cfg.status.as_ref()),
                headers: cfg
                    .headers
                    .iter()
                    .filter_map(|(name, value)| {
                        let parsed = HeaderName::from_bytes(name.as_bytes())
                            .ok()
                            .zip(HeaderValue::from_str(value).ok());
                        if parsed.is_none() {
                            tracing::warn!(header = %name, "Skipping invalid unhandled header");
                        }
                        parsed
                    })
                    .collect(),
                body: match (&cfg.send, &cfg.file) {
                    (Some(text), _) if !text.is_empty() => FallbackBody::Literal(text.clone()),
                    (_, Some(file)) if file.is_absolute() => FallbackBody::File(file.clone()),
                    (_, Some(file)) => FallbackBody::File(cwd.join(file)),
                    (_, None) => FallbackBody::Empty,
                },
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick the entry for `req` and render it. The request is only
    /// inspected up front; the returned future does not borrow it.
    pub fn respond(&self, req: &Request) -> impl Future<Output = Response> + Send + '_ {
        let entry = self.entries.iter().find(|e| e.matcher.matches(req));
        async move {
            match entry {
                Some(entry) => entry.render().await,
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
    }
}

impl FallbackEntry {
    async fn render(&self) -> Response {
        let (status, body, content_type) = match &self.body {
            FallbackBody::Literal(text) => (
                self.status,
                Body::from(text.clone()),
                Some("text/html; charset=utf-8".to_string()),
            ),
            FallbackBody::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let mime = mime_guess::from_path(path).first_or_octet_stream();
                    (self.status, Body::from(bytes), Some(mime.to_string()))
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Unhandled response file unreadable");
                    (DEFAULT_UNHANDLED_STATUS, Body::empty(), None)
                }
            },
            FallbackBody::Empty => (self.status, Body::empty(), None),
        };

        let mut res = Response::new(body);
        for (name, value) in &self.headers {
            res.headers_mut().insert(name.clone(), value.clone());
        }
        *res.status_mut() = status;
        if let Some(ct) = content_type {
            if !res.headers().contains_key(header::CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(&ct) {
                    res.headers_mut().insert(header::CONTENT_TYPE, value);
                }
            }
        }
        res
    }
}

/// Configured status, or 404 when it is not a valid positive status code.
///
/// Text values are read the lenient way: leading digits count, the rest is
/// ignored (`"404 Not Found"` is 404).
pub fn parse_status(spec: Option<&StatusSpec>) -> StatusCode {
    let code = match spec {
        Some(StatusSpec::Number(n)) => n.as_u64(),
        Some(StatusSpec::Text(text)) => {
            let digits: String = text
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u64>().ok()
        }
        None => None,
    };
    code.and_then(|c| u16::try_from(c).ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(DEFAULT_UNHANDLED_STATUS)
}
