mod args;
mod engines;
mod manifest;
mod paths;
mod pipeline;
mod query_log;

use anyhow::Context;
use common::utils::{
    config::get_settings,
    process::{DryRunner, ProcessRunner, ToolRunner},
};
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    paths::Experiment,
    pipeline::{PipelineContext, StepStatus},
};

fn main() -> anyhow::Result<()> {
    // Steps run one after another; a single-threaded runtime is enough to
    // drive the child processes.
    let runtime = Builder::new_current_thread()
        .enable_all()
        .thread_name("reproducibility")
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let parsed = args::parse()?;
    let config = parsed.config;

    let settings = get_settings(&config.settings_path, config.settings_required)
        .with_context(|| format!("loading settings from {}", config.settings_path.display()))?;

    if config.list {
        for name in settings.experiment_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let name = config.experiment.as_deref().unwrap_or_default();
    let base = settings
        .experiment(name)
        .with_context(|| format!("resolving experiment '{name}'"))?;
    let experiment = Experiment::new(base).reconfigure(|inputs| config.apply_overrides(inputs));
    experiment
        .config()
        .validate()
        .context("validating command-line overrides")?;
    regex::Regex::new(&experiment.config().chunk_pattern).with_context(|| {
        format!(
            "experiment '{name}' has an invalid chunk pattern {:?}",
            experiment.config().chunk_pattern
        )
    })?;

    info!(
        experiment = name,
        root = %experiment.paths().root.display(),
        threads = experiment.config().thread_count,
        pef_index_type = %experiment.config().pef_index_type,
        "Experiment resolved"
    );

    if config.print_paths {
        for (label, path) in experiment.paths().entries() {
            println!("{label:<28} {}", path.display());
        }
    }

    if config.selected_steps.is_empty() {
        return Ok(());
    }

    let runner: Box<dyn ToolRunner> = if config.dry_run {
        Box::new(DryRunner)
    } else {
        Box::new(ProcessRunner::new())
    };
    let ctx = PipelineContext {
        experiment: &experiment,
        runner: runner.as_ref(),
        encoding: config.query_encoding,
        dry_run: config.dry_run,
    };

    let report = pipeline::run_steps(&ctx, &config.selected_steps).await?;

    for record in &report.steps {
        let status = match record.status {
            StepStatus::Completed => "ok",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "skipped",
        };
        println!(
            "[{}] {:<16} {status:<8} {}ms",
            report.experiment,
            record.step.label(),
            record.duration_ms
        );
    }
    println!(
        "[{}] {} step(s) completed, report: {}",
        report.experiment,
        report.completed(),
        experiment.paths().run_report.display()
    );

    Ok(())
}
