use thiserror::Error;

use crate::{application::render::RenderError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Short label for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Render(err) if err.is_validation() => "invalid_request",
            AppError::Render(RenderError::CompilationFailed { .. }) => "compilation_failed",
            AppError::Render(RenderError::ToolTimedOut { .. }) => "tool_timeout",
            AppError::Render(RenderError::ToolUnavailable { .. }) => "tool_unavailable",
            AppError::Render(_) => "render_failed",
            AppError::Infra(InfraError::Telemetry(_)) => "telemetry",
            AppError::Infra(_) => "io",
            AppError::Unexpected(_) => "unexpected",
        }
    }
}
