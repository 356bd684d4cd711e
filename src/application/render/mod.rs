//! TikZ rendering pipeline.
//!
//! A request is validated up front, assembled into a standalone LaTeX document,
//! compiled to PDF and rasterized to PNG inside a scratch directory that lives
//! exactly as long as one render. The host decides what to do with the bytes.

mod display;
mod request;
mod service;
mod types;

pub use display::{DisplayBundle, DisplayData, DisplayMetadata, ImageDimensions};
pub use request::{DEFAULT_BORDER, DEFAULT_SCALE, MagicArgs, parse_magic_line};
pub use service::{
    DEFAULT_CONVERT_PROGRAM, DEFAULT_LATEX_PROGRAM, TikzRenderService, Toolchain,
    assemble_document,
};
pub use types::{
    DENSITY_PER_SCALE, LatexDocument, RenderError, RenderOutput, RenderRequest, RenderService,
    ToolRun,
};
