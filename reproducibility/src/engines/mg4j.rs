//! mg4j: builds the reference index and filters the query log against it.

use std::{ffi::OsString, path::Path};

use anyhow::Result;
use common::utils::process::{ToolCommand, ToolRun, ToolRunner};

use super::{ensure_dir, execute, java};
use crate::paths::Experiment;

const INDEX_BUILDER: &str = "it.unimi.di.big.mg4j.tool.IndexBuilder";
const DOCUMENT_SEQUENCE: &str = "org.bitfunnel.reproducibility.ChunkManifestDocumentSequence";
pub(crate) const INDEX_EXPORTER: &str = "org.bitfunnel.reproducibility.IndexExporter";
const QUERY_LOG_RUNNER: &str = "org.bitfunnel.reproducibility.QueryLogRunner";

/// `ChunkManifestDocumentSequence(<manifest>)`, the document sequence mg4j instantiates.
fn document_sequence(manifest: &Path) -> OsString {
    let mut sequence = OsString::from(DOCUMENT_SEQUENCE);
    sequence.push("(");
    sequence.push(manifest);
    sequence.push(")");
    sequence
}

pub fn build_index_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    java(experiment, &paths.mg4j.classpath, INDEX_BUILDER)
        .arg("-o")
        .arg(document_sequence(&paths.manifest))
        .arg(&paths.mg4j.basename)
}

pub fn filter_queries_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    java(experiment, &paths.mg4j.classpath, INDEX_EXPORTER)
        .arg(&paths.mg4j.basename)
        .arg(&paths.queries.dir)
        .arg("--queries")
        .arg(&paths.queries.root_file)
}

pub fn run_queries_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    java(experiment, &paths.mg4j.classpath, QUERY_LOG_RUNNER)
        .arg("-t")
        .arg(experiment.config().thread_count.to_string())
        .arg(&paths.mg4j.basename)
        .arg(&paths.queries.filtered_file)
        .arg(&paths.mg4j.results)
}

pub async fn build_index(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.mg4j.index_dir)?;
    execute(
        runner,
        build_index_command(experiment),
        &paths.mg4j.build_index_log,
    )
    .await
}

/// Writes the in-index query files (text and term ids) into the query directory.
pub async fn filter_query_log(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.queries.dir)?;
    execute(
        runner,
        filter_queries_command(experiment),
        &paths.mg4j.filter_queries_log,
    )
    .await
}

pub async fn run_queries(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.mg4j.index_dir)?;
    execute(
        runner,
        run_queries_command(experiment),
        &paths.mg4j.run_queries_log,
    )
    .await
}
