use std::{
    env,
    path::{Path, PathBuf},
};

use clap::{Args, Parser};

use super::types::{RenderError, RenderRequest};

pub const DEFAULT_BORDER: &str = "4";
pub const DEFAULT_SCALE: f64 = 1.0;

/// Flags accepted on the `%%tikz` magic line.
///
/// Field names follow the long flag spellings (`--latex_packages`,
/// `--tikz_libraries`, ...) so notebooks written against the magic keep working.
#[derive(Debug, Clone, Args, PartialEq)]
pub struct MagicArgs {
    /// Extra package names, comma separated, loaded after `tikz`.
    #[arg(short = 'p', long = "latex_packages", default_value = "", value_name = "PACKAGES")]
    pub latex_packages: String,

    /// Raw LaTeX inserted before `\begin{document}`.
    #[arg(
        short = 'x',
        long = "latex_preamble",
        default_value = "",
        value_name = "LATEX",
        allow_hyphen_values = true
    )]
    pub latex_preamble: String,

    /// TikZ libraries, comma separated.
    #[arg(short = 'l', long = "tikz_libraries", default_value = "", value_name = "LIBRARIES")]
    pub tikz_libraries: String,

    /// File appended to the cell body via `\input`.
    #[arg(short = 'i', long = "input_file", value_name = "PATH")]
    pub input_file: Option<PathBuf>,

    /// Copy the intermediate PDF to this path.
    #[arg(short = 'e', long = "export_file", value_name = "PATH")]
    pub export_file: Option<PathBuf>,

    /// Scale factor; the PDF is rasterized at `scale * 300` dpi.
    #[arg(
        short = 's',
        long = "scale",
        default_value_t = DEFAULT_SCALE,
        value_name = "FACTOR",
        allow_negative_numbers = true
    )]
    pub scale: f64,

    /// Border passed to the standalone document class.
    #[arg(short = 'b', long = "border", default_value = DEFAULT_BORDER, value_name = "BORDER")]
    pub border: String,

    /// Enclose the body in a tikzpicture environment (default).
    #[arg(long = "wrap", overrides_with = "no_wrap")]
    wrap: bool,

    /// Use the body as-is, without a tikzpicture environment.
    #[arg(long = "no-wrap", overrides_with = "wrap")]
    no_wrap: bool,

    /// Print the generated document and tool command lines.
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Default for MagicArgs {
    fn default() -> Self {
        Self {
            latex_packages: String::new(),
            latex_preamble: String::new(),
            tikz_libraries: String::new(),
            input_file: None,
            export_file: None,
            scale: DEFAULT_SCALE,
            border: DEFAULT_BORDER.to_string(),
            wrap: false,
            no_wrap: false,
            debug: false,
        }
    }
}

impl MagicArgs {
    pub fn wrap_env(&self) -> bool {
        // The two flags override each other, so at most one is set.
        self.wrap || !self.no_wrap
    }

    pub fn with_wrap_env(mut self, wrap_env: bool) -> Self {
        self.wrap = wrap_env;
        self.no_wrap = !wrap_env;
        self
    }
}

#[derive(Debug, Parser)]
#[command(name = "%%tikz", no_binary_name = true, disable_help_flag = true)]
struct MagicLine {
    #[command(flatten)]
    args: MagicArgs,
}

/// Split a magic line into shell tokens and parse the flags.
pub fn parse_magic_line(line: &str) -> Result<MagicArgs, RenderError> {
    let tokens = shlex::split(line).ok_or_else(|| RenderError::InvalidArguments {
        message: "unbalanced quotes in magic line".to_string(),
    })?;
    MagicLine::try_parse_from(tokens)
        .map(|parsed| parsed.args)
        .map_err(|err| RenderError::InvalidArguments {
            message: err.to_string().trim().to_string(),
        })
}

impl RenderRequest {
    /// Parse a magic line and cell body relative to the current working directory.
    pub fn parse(line: &str, cell: &str) -> Result<Self, RenderError> {
        Self::from_args(parse_magic_line(line)?, cell)
    }

    /// Validate parsed flags relative to the current working directory.
    pub fn from_args(args: MagicArgs, cell: &str) -> Result<Self, RenderError> {
        let cwd = env::current_dir().map_err(RenderError::WorkingDirectory)?;
        Self::from_args_in(args, cell, &cwd)
    }

    /// Validate parsed flags, resolving relative paths against `cwd`.
    pub fn from_args_in(args: MagicArgs, cell: &str, cwd: &Path) -> Result<Self, RenderError> {
        let wrap_env = args.wrap_env();
        let MagicArgs {
            latex_packages,
            latex_preamble,
            tikz_libraries,
            input_file,
            export_file,
            scale,
            border,
            debug,
            ..
        } = args;

        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderError::InvalidScale { scale });
        }

        let mut body = cell.to_string();
        let input_file = match input_file {
            Some(path) => {
                let resolved = cwd.join(path);
                if !resolved.is_file() {
                    return Err(RenderError::input_file_not_found(&resolved));
                }
                body.push_str(&input_directive(&resolved));
                Some(resolved)
            }
            None => None,
        };

        Ok(Self {
            body,
            latex_packages,
            latex_preamble,
            tikz_libraries,
            input_file,
            export_file: export_file.map(|path| cwd.join(path)),
            scale,
            border,
            wrap_env,
            debug_mode: debug,
        })
    }
}

fn input_directive(path: &Path) -> String {
    let display = path.display().to_string();
    // TeX treats backslashes as control sequences.
    let display = if cfg!(windows) {
        display.replace('\\', "/")
    } else {
        display
    };
    format!("\\input{{{display}}}")
}
