//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! server-config.json (object or array)
//!     → loader.rs (read & deserialize)
//!     → schema.rs (typed SiteDescriptor list)
//!     → validation.rs (port normalization)
//!     → routing::topology (grouping, duplicate & TLS checks)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; topology changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CgiConfig, MountTree, SiteDescriptor, TlsConfig, UnhandledResponse};
pub use validation::ValidationError;
