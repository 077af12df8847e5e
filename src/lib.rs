//! Multi-site static / proxy / CGI server library

pub mod cgi;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod reload;
pub mod routing;
pub mod security;

pub use config::schema::SiteDescriptor;
pub use http::{PipelineCompiler, PortServer};
pub use lifecycle::{RunningListener, ShutdownOutcome, StartupError};
