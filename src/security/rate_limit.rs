//! Per-client rate limiting.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::schema::RateLimitOptions;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// Take one token, or return how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / refill_rate))
        }
    }
}

/// Shared limiter state for one site.
///
/// Buckets idle for a whole window are full again, so they are swept at
/// most once per window instead of being kept forever.
pub struct RateLimiterState {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
    window: Duration,
    last_sweep: Mutex<Instant>,
}

impl RateLimiterState {
    pub fn new(opts: &RateLimitOptions) -> Self {
        let capacity = opts.max.max(1) as f64;
        let window = Duration::from_millis(opts.window_ms.max(1));
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate: capacity / window.as_secs_f64(),
            window,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// `Err` carries the suggested retry delay.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        self.sweep_at(now);
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, now));
        bucket.try_acquire(self.capacity, self.refill_rate, now)
    }

    /// Drop buckets untouched for a full window. Runs at most once per window.
    fn sweep_at(&self, now: Instant) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);

        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < self.window);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Swept idle rate-limit buckets");
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match state.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            metrics::record_rate_limited();
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            let mut response = Response::new(Body::from("Too many requests, please try again later."));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            response
        }
    }
}
