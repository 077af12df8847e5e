//! Configuration validation.
//!
//! # Responsibilities
//! - Normalize each descriptor's port (explicit, `PORT`, default)
//! - Reject ports outside 1..=65535
//! - Name the offending host/port in every error
//!
//! Grouping checks (duplicate host per port, mixed TLS) live with the
//! topology builder in `routing::topology` since they need the grouped view.

use thiserror::Error;

use crate::config::schema::SiteDescriptor;

/// Port used when neither the descriptor nor `PORT` provides one.
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable overriding the default port.
pub const PORT_ENV: &str = "PORT";

/// Semantic configuration errors. Any of these aborts startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid port {value} for host {host}: must be between 1 and 65535")]
    InvalidPort { host: String, value: String },

    #[error("duplicate site for host {host} on port {port}")]
    DuplicateHost { host: String, port: u16 },

    #[error("port {port} mixes TLS and plaintext sites")]
    MixedTls { port: u16 },

    #[error("invalid proxy upstream {url}: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("invalid header {name} for host {host}")]
    InvalidHeader { host: String, name: String },
}

/// Resolve the listening port for a descriptor.
///
/// `env_port` is the raw value of the `PORT` variable, passed in so callers
/// control where ambient state is read.
pub fn normalize_port(site: &SiteDescriptor, env_port: Option<&str>) -> Result<u16, ValidationError> {
    let invalid = |value: String| ValidationError::InvalidPort {
        host: site.display_host().to_string(),
        value,
    };

    if let Some(port) = site.port {
        return u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| invalid(port.to_string()));
    }

    match env_port.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| invalid(raw.to_string())),
        None => Ok(DEFAULT_PORT),
    }
}
