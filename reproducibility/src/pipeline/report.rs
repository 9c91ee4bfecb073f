use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Step;
use crate::{args::ensure_parent, query_log::NormalizeReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub duration_ms: u128,
    pub logs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_log: Option<NormalizeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
}

impl StepRecord {
    pub(super) fn skipped(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            duration_ms: 0,
            logs: Vec::new(),
            error: None,
            query_log: None,
            chunks: None,
        }
    }
}

/// Outcome of one pipeline invocation, written next to the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub experiment: String,
    pub basename: String,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub steps: Vec<StepRecord>,
    pub failed_step: Option<Step>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|record| record.status == StepStatus::Completed)
            .count()
    }
}

pub fn write_report(report: &RunReport, path: &Path) -> Result<PathBuf> {
    ensure_parent(path)?;
    let blob = serde_json::to_vec_pretty(report).context("serialising run report")?;
    std::fs::write(path, blob)
        .with_context(|| format!("writing run report to {}", path.display()))?;
    Ok(path.to_path_buf())
}
