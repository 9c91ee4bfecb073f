//! Sequential execution of experiment steps.
//!
//! Selected steps run in canonical order, one at a time. The first failure
//! stops the run; later steps are recorded as skipped and never started.

mod report;

pub use report::StepStatus;

use report::{RunReport, StepRecord};

use std::{fmt, path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use common::{
    error::AppError,
    utils::process::{ToolRun, ToolRunner},
};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    engines::{bitfunnel, lucene, mg4j, pef},
    manifest,
    paths::Experiment,
    query_log::{self, NormalizeReport, QueryEncoding},
};

/// Experiment operations, declared in the order they must run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize,
)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    FixQueries,
    BuildManifest,
    BuildMg4j,
    FilterQueries,
    BuildPef,
    BuildBitfunnel,
    BuildLucene,
    RunMg4j,
    RunPef,
    RunBitfunnel,
    RunLucene,
}

impl Step {
    pub const ALL: [Self; 11] = [
        Self::FixQueries,
        Self::BuildManifest,
        Self::BuildMg4j,
        Self::FilterQueries,
        Self::BuildPef,
        Self::BuildBitfunnel,
        Self::BuildLucene,
        Self::RunMg4j,
        Self::RunPef,
        Self::RunBitfunnel,
        Self::RunLucene,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::FixQueries => "fix-queries",
            Self::BuildManifest => "build-manifest",
            Self::BuildMg4j => "build-mg4j",
            Self::FilterQueries => "filter-queries",
            Self::BuildPef => "build-pef",
            Self::BuildBitfunnel => "build-bitfunnel",
            Self::BuildLucene => "build-lucene",
            Self::RunMg4j => "run-mg4j",
            Self::RunPef => "run-pef",
            Self::RunBitfunnel => "run-bitfunnel",
            Self::RunLucene => "run-lucene",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// De-duplicate `steps` and put them in execution order.
pub fn canonical_order(steps: &[Step]) -> Vec<Step> {
    let mut ordered = steps.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
}

pub struct PipelineContext<'a> {
    pub experiment: &'a Experiment,
    pub runner: &'a dyn ToolRunner,
    pub encoding: QueryEncoding,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
struct StepOutput {
    logs: Vec<PathBuf>,
    query_log: Option<NormalizeReport>,
    chunks: Option<usize>,
}

impl From<Vec<ToolRun>> for StepOutput {
    fn from(runs: Vec<ToolRun>) -> Self {
        Self {
            logs: runs.into_iter().filter_map(|run| run.log).collect(),
            ..Self::default()
        }
    }
}

impl From<ToolRun> for StepOutput {
    fn from(run: ToolRun) -> Self {
        Self::from(vec![run])
    }
}

async fn run_step(step: Step, ctx: &PipelineContext<'_>) -> Result<StepOutput> {
    let experiment = ctx.experiment;
    let runner = ctx.runner;
    let config = experiment.config();
    let paths = experiment.paths();

    let output = match step {
        Step::FixQueries => StepOutput {
            query_log: Some(query_log::normalize_query_log(
                &config.queries,
                &paths.queries.root_file,
                ctx.encoding,
            )?),
            ..StepOutput::default()
        },
        Step::BuildManifest => {
            let chunks =
                manifest::build_chunk_manifest(&config.chunk_dir, &config.chunk_pattern, &paths.manifest)?;
            StepOutput {
                chunks: Some(chunks.len()),
                ..StepOutput::default()
            }
        }
        Step::BuildMg4j => mg4j::build_index(experiment, runner).await?.into(),
        Step::FilterQueries => mg4j::filter_query_log(experiment, runner).await?.into(),
        Step::BuildPef => pef::build_from_mg4j(experiment, runner).await?.into(),
        Step::BuildBitfunnel => bitfunnel::build_index(experiment, runner).await?.into(),
        Step::BuildLucene => lucene::build_index(experiment, runner).await?.into(),
        Step::RunMg4j => mg4j::run_queries(experiment, runner).await?.into(),
        Step::RunPef => pef::run_queries(experiment, runner).await?.into(),
        Step::RunBitfunnel => bitfunnel::run_queries(experiment, runner).await?.into(),
        Step::RunLucene => lucene::run_queries(experiment, runner).await?.into(),
    };
    Ok(output)
}

/// Run `steps` for the context's experiment and write the run report.
///
/// A failed step is returned as an error naming the step; the report on disk
/// still lists what ran, what failed and what was skipped.
pub async fn run_steps(ctx: &PipelineContext<'_>, steps: &[Step]) -> Result<RunReport> {
    let experiment = ctx.experiment;
    let ordered = canonical_order(steps);
    let mut report = RunReport {
        experiment: experiment.config().name.clone(),
        basename: experiment.config().basename.clone(),
        generated_at: Utc::now(),
        dry_run: ctx.dry_run,
        steps: Vec::with_capacity(ordered.len()),
        failed_step: None,
    };
    let mut failure = None;

    for step in ordered {
        if failure.is_some() {
            report.steps.push(StepRecord::skipped(step));
            continue;
        }

        info!(experiment_step = step.label(), "starting experiment step");
        let started = Instant::now();
        let result = run_step(step, ctx).await;
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                info!(
                    experiment_step = step.label(),
                    duration_ms = elapsed.as_millis(),
                    "completed experiment step"
                );
                report.steps.push(StepRecord {
                    step,
                    status: StepStatus::Completed,
                    duration_ms: elapsed.as_millis(),
                    logs: output.logs,
                    error: None,
                    query_log: output.query_log,
                    chunks: output.chunks,
                });
            }
            Err(err) => {
                let log = err
                    .downcast_ref::<AppError>()
                    .and_then(AppError::tool_log)
                    .cloned();
                error!(
                    experiment_step = step.label(),
                    duration_ms = elapsed.as_millis(),
                    log = ?log,
                    error = %format!("{err:#}"),
                    "experiment step failed; skipping remaining steps"
                );
                report.steps.push(StepRecord {
                    step,
                    status: StepStatus::Failed,
                    duration_ms: elapsed.as_millis(),
                    logs: log.into_iter().collect(),
                    error: Some(format!("{err:#}")),
                    query_log: None,
                    chunks: None,
                });
                report.failed_step = Some(step);
                failure = Some(err);
            }
        }
    }

    let written = report::write_report(&report, &experiment.paths().run_report);
    let name = &experiment.config().name;
    let failed_step = report.failed_step.map_or("unknown", Step::label);

    match (failure, written) {
        (None, Ok(_)) => Ok(report),
        (None, Err(write_err)) => Err(write_err),
        (Some(err), Ok(report_path)) => Err(err).with_context(|| {
            format!(
                "experiment '{name}' stopped at step {failed_step} (run report: {})",
                report_path.display()
            )
        }),
        // The step failure is the primary error; the report problem rides along.
        (Some(err), Err(write_err)) => Err(err).with_context(|| {
            format!(
                "experiment '{name}' stopped at step {failed_step} (run report not written: {write_err:#})"
            )
        }),
    }
}
