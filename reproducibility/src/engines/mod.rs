//! Command lines for the external search engines under comparison.
//!
//! Every operation builds one command from the experiment's resolved paths,
//! makes sure the output directory exists and requires the tool to succeed.

pub mod bitfunnel;
pub mod lucene;
pub mod mg4j;
pub mod pef;

use std::path::Path;

use anyhow::{Context, Result};
use common::utils::process::{ToolCommand, ToolRun, ToolRunner};

use crate::{args::ensure_parent, paths::Experiment};

/// `java -cp <classpath> <main_class>`; callers append positional arguments.
pub(crate) fn java(experiment: &Experiment, classpath: &Path, main_class: &str) -> ToolCommand {
    ToolCommand::new(&experiment.config().java)
        .arg("-cp")
        .arg(classpath)
        .arg(main_class)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating directory {}", dir.display()))
}

/// Run `command` with output captured in `log`; a failed tool is an error.
pub(crate) async fn execute(
    runner: &dyn ToolRunner,
    command: ToolCommand,
    log: &Path,
) -> Result<ToolRun> {
    ensure_parent(log)?;
    let run = runner.run(&command, Some(log)).await?;
    Ok(run.ensure_success()?)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        path::Path,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use common::{
        error::AppError,
        utils::process::{ToolCommand, ToolOutcome, ToolRun, ToolRunner},
    };

    /// Records every command; fails any whose rendering contains `fail_on`.
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub commands: Mutex<Vec<String>>,
        pub fail_on: Option<String>,
    }

    impl RecordingRunner {
        pub(crate) fn failing_on(needle: &str) -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                fail_on: Some(needle.to_string()),
            }
        }

        pub(crate) fn recorded(&self) -> Vec<String> {
            self.commands.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ToolRunner for RecordingRunner {
        async fn run(
            &self,
            command: &ToolCommand,
            log: Option<&Path>,
        ) -> Result<ToolRun, AppError> {
            let rendered = command.to_string();
            let failed = self
                .fail_on
                .as_deref()
                .is_some_and(|needle| rendered.contains(needle));
            if let Ok(mut commands) = self.commands.lock() {
                commands.push(rendered);
            }
            Ok(ToolRun {
                command: command.clone(),
                outcome: if failed {
                    ToolOutcome::Exited(1)
                } else {
                    ToolOutcome::Success
                },
                log: log.map(Path::to_path_buf),
                elapsed: Duration::ZERO,
            })
        }
    }
}
