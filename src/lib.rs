//! Render TikZ snippets to PNG.
//!
//! The crate wraps a snippet in a standalone LaTeX document, compiles it with an
//! external LaTeX engine and rasterizes the PDF with ImageMagick. Hosts (the
//! bundled CLI, a notebook kernel adapter, a web service) construct a
//! [`TikzRenderService`](application::render::TikzRenderService) and call
//! [`RenderService::render`](application::render::RenderService::render).
//!
//! ```no_run
//! use tikzmagic::application::render::{RenderRequest, RenderService, TikzRenderService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = RenderRequest::parse("-s 2 -l arrows.meta", r"\draw[->] (0,0) -- (1,0);")?;
//! let output = TikzRenderService::default().render(&request)?;
//! std::fs::write("arrow.png", &output.png)?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod infra;
