//! Hot reload subsystem.
//!
//! # Data Flow
//! ```text
//! Filesystem change under a watched folder:
//!     → watcher.rs (notify callback, recursive)
//!     → debounce.rs (single timer, reset on every event, 100ms)
//!     → registry.rs (broadcast to every subscriber of the port)
//!     → endpoint.rs (server-sent event `data: reload`)
//! ```
//!
//! # Design Decisions
//! - One registry per port, owned by that port's server and closed on shutdown
//! - Subscribers that cannot be written to are dropped during broadcast

pub mod debounce;
pub mod endpoint;
pub mod registry;
pub mod watcher;

pub use endpoint::{routes, CLIENT_SCRIPT_PATH, STREAM_PATH};
pub use registry::{HotReloadRegistry, Subscription, DEBOUNCE_WINDOW, RELOAD_MESSAGE};
