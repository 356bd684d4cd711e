//! Process-level plumbing: logging setup and infrastructure errors.

pub mod error;
pub mod telemetry;
