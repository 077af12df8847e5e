//! HTTP Basic authentication.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::schema::BasicAuthOptions;

#[derive(Debug, Clone)]
pub struct BasicAuthState {
    users: HashMap<String, String>,
    challenge: Option<HeaderValue>,
}

impl BasicAuthState {
    pub fn new(opts: &BasicAuthOptions) -> Self {
        let challenge = if opts.challenge {
            let realm = opts.realm.replace('"', "");
            HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")).ok()
        } else {
            None
        };
        Self {
            users: opts.users.clone(),
            challenge,
        }
    }

    /// Check an `Authorization` header value.
    pub fn authorize(&self, header: Option<&str>) -> bool {
        let Some((user, pass)) = header.and_then(decode_credentials) else {
            return false;
        };
        self.users
            .get(&user)
            .is_some_and(|expected| constant_time_eq(expected.as_bytes(), pass.as_bytes()))
    }
}

fn decode_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn basic_auth_middleware(
    State(state): State<Arc<BasicAuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if state.authorize(auth_header) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Basic auth rejected");
    let mut response = Response::new(Body::from("Unauthorized"));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    if let Some(challenge) = &state.challenge {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge.clone());
    }
    response
}
