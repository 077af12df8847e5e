//! CORS layer construction.

use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::schema::{CorsOptions, OriginSpec};

const DEFAULT_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::POST,
    Method::DELETE,
];

pub fn create_cors_layer(opts: &CorsOptions) -> CorsLayer {
    let origins: Vec<String> = match &opts.origin {
        None => Vec::new(),
        Some(OriginSpec::One(o)) => vec![o.clone()],
        Some(OriginSpec::Many(list)) => list.clone(),
    };
    let any_origin = origins.is_empty() || origins.iter().any(|o| o == "*");

    // Credentials cannot be combined with `*`, so reflect the caller instead
    let allow_origin = match (any_origin, opts.credentials) {
        (true, false) => AllowOrigin::any(),
        (true, true) => AllowOrigin::mirror_request(),
        (false, _) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        ),
    };

    let methods: Vec<Method> = if opts.methods.is_empty() {
        DEFAULT_METHODS.to_vec()
    } else {
        opts.methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
            .collect()
    };

    let allow_headers = if opts.allowed_headers.is_empty() {
        AllowHeaders::mirror_request()
    } else {
        AllowHeaders::list(
            opts.allowed_headers
                .iter()
                .filter_map(|h| HeaderName::from_bytes(h.trim().as_bytes()).ok()),
        )
    };

    tracing::info!(
        origins = ?origins,
        credentials = opts.credentials,
        "CORS configured"
    );

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(allow_headers)
        .allow_credentials(opts.credentials);
    if let Some(secs) = opts.max_age {
        layer = layer.max_age(Duration::from_secs(secs));
    }
    layer
}
