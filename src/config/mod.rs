//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::{DEFAULT_CONVERT_PROGRAM, DEFAULT_LATEX_PROGRAM};

pub use cli::{
    CellIo, CliArgs, Command, GlobalOverrides, MagicLineArgs, OutputFormat, RenderArgs,
    TemplateArgs,
};

const LOCAL_CONFIG_BASENAME: &str = "tikzmagic";
const ENV_PREFIX: &str = "TIKZMAGIC";
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::WARN;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub toolchain: ToolchainSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ToolchainSettings {
    pub latex_program: PathBuf,
    pub convert_program: PathBuf,
    pub convert_args: Vec<String>,
    pub timeout: Option<Duration>,
    pub strict_exit_status: bool,
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("toolchain.convert_args")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    toolchain: RawToolchainSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.latex_program.as_ref() {
            self.toolchain.latex_program = Some(path.clone());
        }
        if let Some(path) = overrides.convert_program.as_ref() {
            self.toolchain.convert_program = Some(path.clone());
        }
        if let Some(seconds) = overrides.tool_timeout_seconds {
            self.toolchain.timeout_seconds = Some(seconds);
        }
        if let Some(strict) = overrides.strict_exit_status {
            self.toolchain.strict_exit_status = Some(strict);
        }
        if let Some(dir) = overrides.work_dir.as_ref() {
            self.toolchain.work_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, toolchain } = raw;

        let logging = build_logging_settings(logging)?;
        let toolchain = build_toolchain_settings(toolchain)?;

        Ok(Self { logging, toolchain })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => DEFAULT_LOG_LEVEL,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_toolchain_settings(
    toolchain: RawToolchainSettings,
) -> Result<ToolchainSettings, LoadError> {
    let latex_program = toolchain
        .latex_program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LATEX_PROGRAM));
    if latex_program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "toolchain.latex_program",
            "path must not be empty",
        ));
    }

    let convert_program = toolchain
        .convert_program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERT_PROGRAM));
    if convert_program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "toolchain.convert_program",
            "path must not be empty",
        ));
    }

    let convert_args = toolchain
        .convert_args
        .unwrap_or_default()
        .into_iter()
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect();

    let timeout = match toolchain.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "toolchain.timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    let work_dir = toolchain
        .work_dir
        .filter(|dir| !dir.as_os_str().is_empty());

    Ok(ToolchainSettings {
        latex_program,
        convert_program,
        convert_args,
        timeout,
        strict_exit_status: toolchain.strict_exit_status.unwrap_or(false),
        work_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawToolchainSettings {
    latex_program: Option<PathBuf>,
    convert_program: Option<PathBuf>,
    convert_args: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
    strict_exit_status: Option<bool>,
    work_dir: Option<PathBuf>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
