use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use common::utils::config::ExperimentConfig;

use crate::{pipeline::Step, query_log::QueryEncoding};

pub const DEFAULT_SETTINGS_FILE: &str = "experiments.toml";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Experiment settings file (TOML); defaults to ./experiments.toml when present
    #[arg(long = "config", env = "REPRODUCIBILITY_CONFIG")]
    pub settings: Option<PathBuf>,

    /// Experiment to operate on
    #[arg(long, short = 'e')]
    pub experiment: Option<String>,

    /// Step to run; repeat for several. Steps always run in pipeline order
    #[arg(long = "step", value_enum)]
    pub steps: Vec<Step>,

    /// Run every step
    #[arg(long, conflicts_with = "steps")]
    pub all: bool,

    /// Override the thread count passed to the engines
    #[arg(long)]
    pub threads: Option<usize>,

    /// Override the BitFunnel term table density
    #[arg(long)]
    pub density: Option<f64>,

    /// Override the Partitioned Elias-Fano index variant
    #[arg(long)]
    pub pef_index_type: Option<String>,

    /// How to decode the raw query log
    #[arg(long, value_enum, default_value_t = QueryEncoding::default())]
    pub query_encoding: QueryEncoding,

    /// Log external commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the derived paths of the experiment
    #[arg(long)]
    pub print_paths: bool,

    /// List the experiments defined in the settings file and exit
    #[arg(long)]
    pub list: bool,

    // Computed fields (not arguments)
    #[arg(skip)]
    pub settings_path: PathBuf,
    #[arg(skip)]
    pub settings_required: bool,
    #[arg(skip)]
    pub selected_steps: Vec<Step>,
}

impl Config {
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(path) = &self.settings {
            self.settings_path = path.clone();
            self.settings_required = true;
        } else {
            self.settings_path = PathBuf::from(DEFAULT_SETTINGS_FILE);
            self.settings_required = false;
        }

        self.selected_steps = if self.all {
            Step::ALL.to_vec()
        } else {
            crate::pipeline::canonical_order(&self.steps)
        };

        if self.list {
            return Ok(());
        }

        if self.experiment.is_none() {
            return Err(anyhow!("--experiment is required (use --list to see defined experiments)"));
        }

        if self.selected_steps.is_empty() && !self.print_paths {
            return Err(anyhow!(
                "nothing to do: pass --step <STEP>, --all or --print-paths"
            ));
        }

        if let Some(threads) = self.threads {
            if threads == 0 {
                return Err(anyhow!("--threads must be greater than zero"));
            }
        }

        if let Some(density) = self.density {
            if !(density > 0.0 && density <= 1.0) {
                return Err(anyhow!(
                    "--density must be in (0, 1] (got {density})"
                ));
            }
        }

        if let Some(variant) = &self.pef_index_type {
            if variant.trim().is_empty() {
                return Err(anyhow!("--pef-index-type requires a non-empty variant"));
            }
        }

        Ok(())
    }

    /// Apply command-line overrides to the experiment's base inputs.
    pub fn apply_overrides(&self, config: &mut ExperimentConfig) {
        if let Some(threads) = self.threads {
            config.thread_count = threads;
        }
        if let Some(density) = self.density {
            config.bf_density = density;
        }
        if let Some(variant) = &self.pef_index_type {
            config.pef_index_type.clone_from(variant);
        }
    }
}

pub struct ParsedArgs {
    pub config: Config,
}

pub fn parse() -> Result<ParsedArgs> {
    let mut config = Config::parse();
    config.finalize()?;
    Ok(ParsedArgs { config })
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory for {}", path.display()))?;
    }
    Ok(())
}

/// A path as text for files that other tools read back. `display()` would
/// silently replace invalid UTF-8, naming a file that does not exist.
pub fn path_text(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("path {} is not valid UTF-8", path.display()))
}
