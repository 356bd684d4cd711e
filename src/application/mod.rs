//! Application layer: the rendering pipeline and the errors surfaced to hosts.

pub mod error;
pub mod render;
