//! Launching external tools and capturing their console output.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    fs::File,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::AppError;

/// A program plus its argument list. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_word(f, &self.program)?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_word(f, arg)?;
        }
        Ok(())
    }
}

fn write_word(f: &mut fmt::Formatter<'_>, word: &OsStr) -> fmt::Result {
    let text = word.to_string_lossy();
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        write!(f, "\"{text}\"")
    } else {
        f.write_str(&text)
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    Exited(i32),
    /// Killed by a signal; the number is unavailable off unix.
    Terminated(Option<i32>),
}

impl ToolOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<ExitStatus> for ToolOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        match status.code() {
            Some(code) => Self::Exited(code),
            None => Self::Terminated(signal_of(status)),
        }
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "succeeded"),
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Terminated(Some(signal)) => write!(f, "was terminated by signal {signal}"),
            Self::Terminated(None) => write!(f, "was terminated by a signal"),
        }
    }
}

/// Result of one tool invocation. Callers decide what a failure means.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub command: ToolCommand,
    pub outcome: ToolOutcome,
    pub log: Option<PathBuf>,
    pub elapsed: Duration,
}

impl ToolRun {
    /// Turn a non-successful outcome into [`AppError::ToolFailed`].
    pub fn ensure_success(self) -> Result<Self, AppError> {
        if self.outcome.is_success() {
            Ok(self)
        } else {
            Err(AppError::ToolFailed {
                program: self.command.program_name(),
                outcome: self.outcome,
                log: self.log,
            })
        }
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `command` to completion. With `log`, stdout and stderr both go to
    /// that file (truncated first); otherwise they are inherited.
    async fn run(&self, command: &ToolCommand, log: Option<&Path>) -> Result<ToolRun, AppError>;
}

/// Spawns real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// Runs children in the current working directory.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand, log: Option<&Path>) -> Result<ToolRun, AppError> {
        info!(command = %command, log = ?log, "Running tool");

        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(path) = log {
            let log_error = |source: std::io::Error| AppError::ToolLog {
                path: path.to_path_buf(),
                source,
            };
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(log_error)?;
            }
            let stdout = File::create(path).map_err(log_error)?;
            let stderr = stdout.try_clone().map_err(log_error)?;
            cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
        }

        let started = Instant::now();
        let status = cmd
            .status()
            .await
            .map_err(|source| AppError::ToolLaunch {
                program: command.program_name(),
                source,
            })?;
        let elapsed = started.elapsed();
        let outcome = ToolOutcome::from(status);

        if outcome.is_success() {
            info!(
                program = %command.program_name(),
                duration_ms = elapsed.as_millis(),
                "Finished"
            );
        } else {
            warn!(
                program = %command.program_name(),
                outcome = %outcome,
                duration_ms = elapsed.as_millis(),
                log = ?log,
                "Tool did not succeed"
            );
        }

        Ok(ToolRun {
            command: command.clone(),
            outcome,
            log: log.map(Path::to_path_buf),
            elapsed,
        })
    }
}

/// Logs commands without executing them and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunner;

#[async_trait]
impl ToolRunner for DryRunner {
    async fn run(&self, command: &ToolCommand, log: Option<&Path>) -> Result<ToolRun, AppError> {
        info!(command = %command, log = ?log, "Dry run; not executing");
        Ok(ToolRun {
            command: command.clone(),
            outcome: ToolOutcome::Success,
            log: log.map(Path::to_path_buf),
            elapsed: Duration::ZERO,
        })
    }
}
