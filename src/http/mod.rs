//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum app for the port)
//!     → routing::router (pick the site by host)
//!     → pipeline.rs (site middleware)
//!     → stage.rs (static → CGI → proxy)
//!     → fallback.rs (unhandled responses, 404)
//! ```

pub mod fallback;
pub mod middleware;
pub mod mount;
pub mod pipeline;
pub mod proxy;
pub mod server;
pub mod stage;

pub use pipeline::{CompiledPipeline, PipelineCompiler};
pub use server::PortServer;
