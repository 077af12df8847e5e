//! CGI/1.1 gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Request under the CGI mount
//!     → gateway.rs (sandbox check, spawn, stream stdin/stdout)
//!     → env.rs (CGI/1.1 environment from the request)
//!     → parser.rs (split script output into head and body)
//!     → Streamed HTTP response
//! ```
//!
//! # Design Decisions
//! - A script outside its directory is a routing miss, never an error
//! - Spawn failures and scripts without a head become 500 responses
//! - stderr is logged, never sent to the client

pub mod env;
pub mod gateway;
pub mod parser;

pub use gateway::{CgiGateway, ResolvedScript, NO_OUTPUT_MESSAGE};
pub use parser::{CgiHead, CgiOutputParser};
