//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Topology Compilation (at startup):
//!     SiteDescriptor[]
//!     → topology.rs (normalize ports, reject duplicates / mixed TLS)
//!     → PortGroup[] (specific hosts first, wildcard last)
//!
//! Incoming Request (host header):
//!     → router.rs (scan the port's pipelines in order)
//!     → matcher.rs (host predicate)
//!     → matched CompiledPipeline, or 404
//! ```
//!
//! # Design Decisions
//! - Topology compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same site
//! - First match wins

pub mod matcher;
pub mod router;
pub mod topology;

pub use matcher::{AcceptMatcher, HostMatcher, Matcher};
pub use router::SiteRouter;
pub use topology::PortGroup;
