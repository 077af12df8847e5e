//! Favicon responder.
//!
//! Answers `/favicon.ico` from the configured file before the request
//! reaches rate limiting, auth, or content stages.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;

pub const FAVICON_PATH: &str = "/favicon.ico";

const CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Debug, Clone)]
pub struct FaviconState {
    file: PathBuf,
}

impl FaviconState {
    pub fn new(file: PathBuf) -> Self {
        Self { file }
    }
}

pub async fn favicon_middleware(
    State(state): State<Arc<FaviconState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() != FAVICON_PATH {
        return next.run(request).await;
    }

    let method = request.method().clone();
    if method == Method::OPTIONS {
        return (StatusCode::OK, [(header::ALLOW, "GET, HEAD, OPTIONS")]).into_response();
    }
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD, OPTIONS")],
        )
            .into_response();
    }

    let mut response = match ServeFile::new(&state.file).oneshot(request).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    };
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    }
    response
}
