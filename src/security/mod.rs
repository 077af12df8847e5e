//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (per site, outermost first):
//!     → headers.rs (hardening headers on the way out)
//!     → rate_limit.rs (per-client token bucket, 429 when empty)
//!     → basic_auth.rs (401 unless credentials match)
//!     → Pass to content stages
//! ```
//!
//! # Design Decisions
//! - Every block is opt-in per site
//! - Fail closed: reject on any security check failure

pub mod basic_auth;
pub mod headers;
pub mod rate_limit;

pub use basic_auth::{basic_auth_middleware, BasicAuthState};
pub use headers::{security_headers_middleware, SecurityHeaders};
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
