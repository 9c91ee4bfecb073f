use std::path::PathBuf;

use thiserror::Error;

use crate::utils::process::ToolOutcome;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Failed to launch {program}: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open tool log {}: {source}", .path.display())]
    ToolLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} {}{}", .program, .outcome, log_hint(.log.as_ref()))]
    ToolFailed {
        program: String,
        outcome: ToolOutcome,
        log: Option<PathBuf>,
    },
}

fn log_hint(log: Option<&PathBuf>) -> String {
    log.map(|path| format!(" (see {})", path.display()))
        .unwrap_or_default()
}

impl AppError {
    /// Log file attached to a failed tool invocation, if output was redirected.
    pub fn tool_log(&self) -> Option<&PathBuf> {
        match self {
            Self::ToolFailed { log, .. } => log.as_ref(),
            _ => None,
        }
    }
}
