use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

/// Pixels per inch produced for a scale factor of `1.0`.
pub const DENSITY_PER_SCALE: f64 = 300.0;

/// Validated rendering request passed into the pipeline.
///
/// Built from magic-line flags by [`RenderRequest::parse`] or
/// [`RenderRequest::from_args`]; both resolve relative paths against the working
/// directory and reject a missing input file before any tool runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Cell body, with the `\input{...}` directive already appended when an input
    /// file was requested.
    pub body: String,
    /// Comma-joined package names placed after `tikz` in `\usepackage`.
    pub latex_packages: String,
    /// Raw LaTeX inserted before `\begin{document}`.
    pub latex_preamble: String,
    /// Names placed in `\usetikzlibrary`.
    pub tikz_libraries: String,
    /// Absolute path of the included input file, if any.
    pub input_file: Option<PathBuf>,
    /// Absolute destination for a copy of the intermediate PDF.
    pub export_file: Option<PathBuf>,
    /// Rasterization scale; always finite and positive.
    pub scale: f64,
    /// Value of the `border` option on the standalone document class.
    pub border: String,
    /// Whether the body is enclosed in a `tikzpicture` environment.
    pub wrap_env: bool,
    /// Echo the document and tool command lines to stderr before running.
    pub debug_mode: bool,
}

impl RenderRequest {
    /// Rasterization density handed to the converter (`trunc(scale * 300)`).
    pub fn density(&self) -> u32 {
        density_for_scale(self.scale)
    }
}

pub(crate) fn density_for_scale(scale: f64) -> u32 {
    // `as` truncates toward zero and saturates, which is the conversion we want.
    (scale * DENSITY_PER_SCALE) as u32
}

/// LaTeX source derived from a request. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatexDocument(String);

impl LatexDocument {
    pub(crate) fn new(source: String) -> Self {
        Self(source)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LatexDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    pub program: String,
    pub args: Vec<String>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolRun {
    /// Shell-quoted command line, suitable for copy-pasting into a terminal.
    pub fn command_line(&self) -> String {
        format_command_line(&self.program, &self.args)
    }

    fn status_label(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "a signal".to_string(),
        }
    }
}

pub(crate) fn format_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|part| shlex::try_quote(part).map_or_else(|_| part.to_string(), |q| q.into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a successful render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Raw PNG bytes produced by the converter.
    pub png: Vec<u8>,
    pub document: LatexDocument,
    pub density: u32,
    pub compile: ToolRun,
    pub convert: ToolRun,
    /// Where the intermediate PDF was copied, when requested.
    pub exported_pdf: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Structured errors surfaced by the rendering pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid magic arguments: {message}")]
    InvalidArguments { message: String },
    #[error("scale must be a positive number, got {scale}")]
    InvalidScale { scale: f64 },
    #[error("input file `{}` does not exist in the current working directory", path.display())]
    InputFileNotFound { path: PathBuf },
    #[error("failed to resolve working directory: {0}")]
    WorkingDirectory(io::Error),
    #[error("failed to prepare render workspace: {0}")]
    Workspace(io::Error),
    #[error("failed to write LaTeX source: {0}")]
    WriteSource(io::Error),
    #[error("`{program}` is unavailable: {source}")]
    ToolUnavailable { program: String, source: io::Error },
    #[error("failed to run `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("`{program}` did not finish within {timeout:?}")]
    ToolTimedOut { program: String, timeout: Duration },
    #[error("`{}` didn't produce a PDF file ({})", run.program, run.status_label())]
    CompilationFailed { run: Box<ToolRun> },
    #[error("`{}` failed with {}", run.program, run.status_label())]
    ToolFailed { run: Box<ToolRun> },
    #[error("failed to export PDF to `{}`: {source}", path.display())]
    Export { path: PathBuf, source: io::Error },
    #[error("failed to read rendered image `{}`: {source}", path.display())]
    ReadImage { path: PathBuf, source: io::Error },
}

impl RenderError {
    /// Errors raised while validating a request, before any workspace exists.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidArguments { .. }
                | RenderError::InvalidScale { .. }
                | RenderError::InputFileNotFound { .. }
        )
    }

    /// The tool run attached to this error, if one completed.
    pub fn tool_run(&self) -> Option<&ToolRun> {
        match self {
            RenderError::CompilationFailed { run } | RenderError::ToolFailed { run } => Some(run),
            _ => None,
        }
    }

    pub(crate) fn input_file_not_found(path: &Path) -> Self {
        Self::InputFileNotFound {
            path: path.to_path_buf(),
        }
    }
}

/// Trait exposed by the rendering pipeline so hosts can swap in their own
/// implementation (or a fake in tests).
pub trait RenderService: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}
