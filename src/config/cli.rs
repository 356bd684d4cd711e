use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};

use crate::application::render::MagicArgs;

/// Command-line arguments for the tikzmagic binary.
#[derive(Debug, Parser)]
#[command(
    name = "tikzmagic",
    version,
    about = "Render TikZ snippets to PNG via LaTeX and ImageMagick"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TIKZMAGIC_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a cell body to PNG using magic flags.
    Render(RenderArgs),
    /// Render using a raw magic line, exactly as a notebook hands it over.
    Magic(MagicLineArgs),
    /// Print the assembled LaTeX document without running any tool.
    Template(TemplateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub magic: MagicArgs,

    #[command(flatten)]
    pub io: CellIo,
}

#[derive(Debug, Args, Clone)]
pub struct MagicLineArgs {
    /// The magic line, e.g. `-s 2 -l arrows.meta --no-wrap`.
    #[arg(long, default_value = "", value_name = "LINE", allow_hyphen_values = true)]
    pub line: String,

    #[command(flatten)]
    pub io: CellIo,
}

#[derive(Debug, Args, Clone)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub magic: MagicArgs,

    /// Read the cell body from this file instead of stdin.
    #[arg(short = 'c', long = "cell", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub cell: Option<PathBuf>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct CellIo {
    /// Read the cell body from this file instead of stdin.
    #[arg(short = 'c', long = "cell", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub cell: Option<PathBuf>,

    /// Write the result to this file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Output encoding.
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Png)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Raw PNG bytes.
    #[default]
    Png,
    /// Jupyter `display_data` JSON bundle with a base64 PNG.
    DisplayData,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the LaTeX compiler executable.
    #[arg(long = "latex-program", value_name = "PATH", global = true)]
    pub latex_program: Option<PathBuf>,

    /// Override the PDF-to-PNG converter executable.
    #[arg(long = "convert-program", value_name = "PATH", global = true)]
    pub convert_program: Option<PathBuf>,

    /// Kill an external tool after this many seconds.
    #[arg(long = "tool-timeout-seconds", value_name = "SECONDS", global = true)]
    pub tool_timeout_seconds: Option<u64>,

    /// Fail when a tool exits non-zero, even if it produced output.
    #[arg(
        long = "strict-exit-status",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub strict_exit_status: Option<bool>,

    /// Directory in which per-render scratch directories are created.
    #[arg(long = "work-dir", value_name = "PATH", global = true)]
    pub work_dir: Option<PathBuf>,
}
