//! BitFunnel: statistics and term table builds, then a scripted repl session
//! that replays the filtered query log at every thread count up to the
//! configured maximum.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use common::utils::process::{ToolCommand, ToolRun, ToolRunner};
use tracing::info;

use super::{ensure_dir, execute};
use crate::{args::path_text, paths::Experiment};

pub fn statistics_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    ToolCommand::new(&experiment.config().tools.bitfunnel)
        .arg("statistics")
        .arg(&paths.manifest)
        .arg(&paths.bitfunnel.index_dir)
}

pub fn term_table_command(experiment: &Experiment) -> ToolCommand {
    let config = experiment.config();
    ToolCommand::new(&config.tools.bitfunnel)
        .arg("termtable")
        .arg(&experiment.paths().bitfunnel.index_dir)
        .arg(config.bf_density.to_string())
        .arg(&config.bf_treatment)
}

pub fn repl_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    ToolCommand::new(&experiment.config().tools.bitfunnel)
        .arg("repl")
        .arg(&paths.bitfunnel.index_dir)
        .arg("-script")
        .arg(&paths.bitfunnel.repl_script)
}

/// Repl commands: load the manifest once, then one query-log pass per thread
/// count, each writing into its own results directory.
pub fn repl_script(experiment: &Experiment) -> Result<String> {
    let paths = experiment.paths();
    let filtered = path_text(&paths.queries.filtered_file)?;
    let mut script = String::new();
    let _ = writeln!(script, "load manifest {}", path_text(&paths.manifest)?);
    script.push_str("status\n");
    script.push_str("compiler\n");
    for threads in 1..=experiment.config().thread_count {
        let results_dir = paths.bitfunnel.results_dir(threads);
        let _ = writeln!(script, "threads {threads}");
        let _ = writeln!(script, "cd {}", path_text(&results_dir)?);
        let _ = writeln!(script, "query log {filtered}");
    }
    script.push_str("quit\n");
    Ok(script)
}

/// Gather corpus statistics, then build the term table.
///
/// Only a single shard is supported, so the shard definition is left empty.
pub async fn build_index(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<Vec<ToolRun>> {
    let paths = experiment.paths();
    ensure_dir(&paths.bitfunnel.index_dir)?;
    std::fs::File::create(&paths.bitfunnel.shard_definition).with_context(|| {
        format!(
            "creating shard definition {}",
            paths.bitfunnel.shard_definition.display()
        )
    })?;

    let statistics = execute(
        runner,
        statistics_command(experiment),
        &paths.bitfunnel.build_statistics_log,
    )
    .await?;
    let term_table = execute(
        runner,
        term_table_command(experiment),
        &paths.bitfunnel.build_term_table_log,
    )
    .await?;
    Ok(vec![statistics, term_table])
}

pub async fn run_queries(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.bitfunnel.index_dir)?;
    for threads in 1..=experiment.config().thread_count {
        let results_dir = paths.bitfunnel.results_dir(threads);
        if !results_dir.exists() {
            info!(dir = %results_dir.display(), "mkdir");
            ensure_dir(&results_dir)?;
        }
    }
    std::fs::write(&paths.bitfunnel.repl_script, repl_script(experiment)?).with_context(|| {
        format!(
            "writing repl script {}",
            paths.bitfunnel.repl_script.display()
        )
    })?;

    execute(
        runner,
        repl_command(experiment),
        &paths.bitfunnel.run_queries_log,
    )
    .await
}
