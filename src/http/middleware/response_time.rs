//! Response timing header.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::config::schema::ResponseTimeOptions;

#[derive(Debug, Clone)]
pub struct ResponseTimeState {
    header: HeaderName,
    digits: usize,
}

impl ResponseTimeState {
    pub fn new(opts: &ResponseTimeOptions) -> Option<Self> {
        let header = HeaderName::from_bytes(opts.header.as_bytes()).ok()?;
        Some(Self {
            header,
            digits: opts.digits,
        })
    }

    pub fn format(&self, millis: f64) -> String {
        format!("{:.*}ms", self.digits, millis)
    }
}

/// Time from request entry until the response head is produced.
pub async fn response_time_middleware(
    State(state): State<Arc<ResponseTimeState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&state.format(elapsed)) {
        response.headers_mut().insert(state.header.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_digits() {
        let state = ResponseTimeState::new(&ResponseTimeOptions {
            header: "X-Response-Time".into(),
            digits: 2,
        })
        .unwrap();
        assert_eq!(state.format(1.23456), "1.23ms");
    }

    #[test]
    fn invalid_header_name_disables() {
        assert!(ResponseTimeState::new(&ResponseTimeOptions {
            header: "bad header".into(),
            digits: 3,
        })
        .is_none());
    }
}
