//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Compile port groups → Load TLS → Bind all ports → Serve → Ready
//!
//! Shutdown (shutdown.rs):
//!     Trigger → every listener drains at once → countdown → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/"shutdown" message → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pipelines, then listeners
//! - Shutdown waits for the slowest listener, never serially
//! - Shutdown has timeout: forced exit after deadline

pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use manager::run;
pub use shutdown::{coordinate, Drain, ShutdownOutcome, SHUTDOWN_DEADLINE};
pub use startup::{first_stopped, start_all, RunningListener, StartupError};
