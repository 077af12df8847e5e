//! Per-site middleware that is not a security concern.

pub mod cors;
pub mod favicon;
pub mod response_time;
