//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! PortGroup
//!     → listener.rs (bind std listener, classify bind errors)
//!     → tls.rs (load key/cert/ca when the port is TLS)
//!     → Hand off to http::server
//! ```
//!
//! # Design Decisions
//! - All ports are bound before any server runs
//! - TLS is per port, never per host

pub mod listener;
pub mod tls;

pub use listener::{bind, ListenerError};
pub use tls::{load_tls_config, TlsError};
