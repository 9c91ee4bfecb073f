//! Partitioned Elias-Fano: a collection exported from mg4j, compressed by
//! `create_freq_index` and queried by `Runner`.

use anyhow::Result;
use common::utils::process::{ToolCommand, ToolRun, ToolRunner};

use super::{ensure_dir, execute, java, mg4j::INDEX_EXPORTER};
use crate::paths::Experiment;

pub fn build_collection_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    java(experiment, &paths.mg4j.classpath, INDEX_EXPORTER)
        .arg(&paths.mg4j.basename)
        .arg(&paths.pef.basename)
        .arg("--index")
}

pub fn build_index_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    ToolCommand::new(&paths.pef.creator)
        .arg(&experiment.config().pef_index_type)
        .arg(&paths.pef.collection)
        .arg(&paths.pef.index_file)
}

pub fn run_queries_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    let config = experiment.config();
    ToolCommand::new(&paths.pef.runner)
        .arg(&config.pef_index_type)
        .arg(&paths.pef.index_file)
        .arg(&paths.queries.pef_file)
        .arg(config.thread_count.to_string())
        .arg(&paths.pef.results)
}

/// Export the mg4j index as a PEF input collection.
pub async fn build_collection(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.pef.index_dir)?;
    execute(
        runner,
        build_collection_command(experiment),
        &paths.pef.build_collection_log,
    )
    .await
}

pub async fn build_index(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.pef.index_dir)?;
    execute(
        runner,
        build_index_command(experiment),
        &paths.pef.build_index_log,
    )
    .await
}

/// Export from mg4j, then compress. Stops after a failed export.
pub async fn build_from_mg4j(
    experiment: &Experiment,
    runner: &dyn ToolRunner,
) -> Result<Vec<ToolRun>> {
    let collection = build_collection(experiment, runner).await?;
    let index = build_index(experiment, runner).await?;
    Ok(vec![collection, index])
}

pub async fn run_queries(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.pef.index_dir)?;
    execute(
        runner,
        run_queries_command(experiment),
        &paths.pef.run_queries_log,
    )
    .await
}
