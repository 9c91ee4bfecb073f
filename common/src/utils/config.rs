use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_THREAD_COUNT: usize = 8;
pub const DEFAULT_BF_DENSITY: f64 = 0.15;
pub const DEFAULT_PEF_INDEX_TYPE: &str = "opt";
pub const DEFAULT_BF_TREATMENT: &str = "Optimal";

/// Locations of the external tools driven by an experiment.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    /// BitFunnel command-line executable
    pub bitfunnel: PathBuf,
    /// LuceneRunner checkout; the jar is expected under `target/`
    pub lucene_repo: PathBuf,
    /// mg4j-workbench checkout; the jar is expected under `target/`
    pub mg4j_repo: PathBuf,
    /// Directory holding `create_freq_index` and `Runner`
    pub pef_bin: PathBuf,
}

/// One experiment instance as written in the settings file.
#[derive(Clone, Deserialize, Debug)]
pub struct ExperimentDefinition {
    #[serde(default)]
    pub tools: Option<ToolPaths>,
    pub index_root: PathBuf,
    pub basename: String,
    pub chunk_dir: PathBuf,
    pub chunk_pattern: String,
    pub queries: PathBuf,
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default = "default_bf_density")]
    pub bf_density: f64,
    #[serde(default = "default_pef_index_type")]
    pub pef_index_type: String,
    #[serde(default = "default_bf_treatment")]
    pub bf_treatment: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Settings {
    /// Shared tool locations, used by experiments that do not name their own
    #[serde(default)]
    pub tools: Option<ToolPaths>,
    /// Launcher for the jar-based tools
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default)]
    pub experiments: BTreeMap<String, ExperimentDefinition>,
}

/// Fully resolved base inputs of one experiment.
///
/// Every derived path is computed from these fields; a changed input means a
/// new value, never an edit of derived state.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentConfig {
    pub name: String,
    pub tools: ToolPaths,
    pub java: PathBuf,
    pub index_root: PathBuf,
    pub basename: String,
    pub chunk_dir: PathBuf,
    pub chunk_pattern: String,
    pub queries: PathBuf,
    pub thread_count: usize,
    pub bf_density: f64,
    pub pef_index_type: String,
    pub bf_treatment: String,
}

fn default_thread_count() -> usize {
    DEFAULT_THREAD_COUNT
}

fn default_bf_density() -> f64 {
    DEFAULT_BF_DENSITY
}

fn default_pef_index_type() -> String {
    DEFAULT_PEF_INDEX_TYPE.to_string()
}

fn default_bf_treatment() -> String {
    DEFAULT_BF_TREATMENT.to_string()
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

fn environment() -> Environment {
    Environment::with_prefix("REPRO")
        .prefix_separator("_")
        .separator("__")
}

/// Load experiment settings from `path`, layered with `REPRO_*` environment overrides.
pub fn get_settings(path: &Path, required: bool) -> Result<Settings, AppError> {
    let config = Config::builder()
        .add_source(File::from(path).required(required))
        .add_source(environment())
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Parse settings from an in-memory TOML document.
pub fn parse_settings(toml: &str) -> Result<Settings, AppError> {
    let config = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?;

    Ok(config.try_deserialize()?)
}

impl Settings {
    pub fn experiment_names(&self) -> impl Iterator<Item = &str> {
        self.experiments.keys().map(String::as_str)
    }

    /// Resolve a named experiment against the shared settings.
    pub fn experiment(&self, name: &str) -> Result<ExperimentConfig, AppError> {
        let definition = self.experiments.get(name).ok_or_else(|| {
            let known = self.experiment_names().collect::<Vec<_>>().join(", ");
            AppError::NotFound(format!(
                "experiment '{name}' is not defined (known: {known})"
            ))
        })?;

        let tools = definition
            .tools
            .clone()
            .or_else(|| self.tools.clone())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "experiment '{name}' has no tool paths and no shared [tools] table is set"
                ))
            })?;

        let config = ExperimentConfig {
            name: name.to_string(),
            tools,
            java: self.java.clone(),
            index_root: definition.index_root.clone(),
            basename: definition.basename.clone(),
            chunk_dir: definition.chunk_dir.clone(),
            chunk_pattern: definition.chunk_pattern.clone(),
            queries: definition.queries.clone(),
            thread_count: definition.thread_count,
            bf_density: definition.bf_density,
            pef_index_type: definition.pef_index_type.clone(),
            bf_treatment: definition.bf_treatment.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.basename.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "experiment '{}' needs a non-empty basename",
                self.name
            )));
        }
        if self.thread_count == 0 {
            return Err(AppError::Validation(format!(
                "experiment '{}': thread_count must be greater than zero",
                self.name
            )));
        }
        if !(self.bf_density > 0.0 && self.bf_density <= 1.0) {
            return Err(AppError::Validation(format!(
                "experiment '{}': bf_density must be in (0, 1] (got {})",
                self.name, self.bf_density
            )));
        }
        if self.pef_index_type.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "experiment '{}': pef_index_type must not be empty",
                self.name
            )));
        }
        if self.bf_treatment.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "experiment '{}': bf_treatment must not be empty",
                self.name
            )));
        }
        if self.queries.file_name().is_none() {
            return Err(AppError::Validation(format!(
                "experiment '{}': query log path {} has no file name",
                self.name,
                self.queries.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
java = "/usr/bin/java"

[tools]
bitfunnel = "/opt/bf/BitFunnel"
lucene_repo = "/opt/LuceneRunner"
mg4j_repo = "/opt/mg4j-workbench"
pef_bin = "/opt/pef/bin"

[experiments.small]
index_root = "/data/indexes"
basename = "273-150-100"
chunk_dir = "/data/chunks-100-150"
chunk_pattern = "GX.*"
queries = "/data/queries/06.efficiency_topics.all"

[experiments.tuned]
index_root = "/data/indexes"
basename = "273-1000-1500"
chunk_dir = "/data/chunks-1000-1500"
chunk_pattern = "GX000.*"
queries = "/data/queries/06.efficiency_topics.all"
thread_count = 16
bf_density = 0.1
pef_index_type = "block_optpfor"

[experiments.tuned.tools]
bitfunnel = "/home/me/BitFunnel"
lucene_repo = "/home/me/LuceneRunner"
mg4j_repo = "/home/me/mg4j-workbench"
pef_bin = "/home/me/pef/bin"
"#;

    #[test]
    fn experiment_applies_documented_defaults() {
        let settings = parse_settings(SAMPLE).expect("sample parses");
        let config = settings.experiment("small").expect("small resolves");

        assert_eq!(config.thread_count, DEFAULT_THREAD_COUNT);
        assert!((config.bf_density - DEFAULT_BF_DENSITY).abs() < f64::EPSILON);
        assert_eq!(config.pef_index_type, "opt");
        assert_eq!(config.bf_treatment, "Optimal");
        assert_eq!(config.java, PathBuf::from("/usr/bin/java"));
        assert_eq!(config.tools.bitfunnel, PathBuf::from("/opt/bf/BitFunnel"));
    }

    #[test]
    fn experiment_tools_override_shared_table() {
        let settings = parse_settings(SAMPLE).expect("sample parses");
        let config = settings.experiment("tuned").expect("tuned resolves");

        assert_eq!(config.tools.pef_bin, PathBuf::from("/home/me/pef/bin"));
        assert_eq!(config.thread_count, 16);
        assert_eq!(config.pef_index_type, "block_optpfor");
    }

    #[test]
    fn unknown_experiment_lists_known_names() {
        let settings = parse_settings(SAMPLE).expect("sample parses");
        let err = settings.experiment("missing").unwrap_err();

        match err {
            AppError::NotFound(message) => {
                assert!(message.contains("small"));
                assert!(message.contains("tuned"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn experiment_without_tools_is_rejected() {
        let toml = r#"
[experiments.bare]
index_root = "/data/indexes"
basename = "bare"
chunk_dir = "/data/chunks"
chunk_pattern = "GX.*"
queries = "/data/queries/topics"
"#;
        let settings = parse_settings(toml).expect("bare parses");
        assert_eq!(settings.java, PathBuf::from("java"));

        let result = settings.experiment("bare");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_threads_and_bad_density() {
        let settings = parse_settings(SAMPLE).expect("sample parses");
        let config = settings.experiment("small").expect("small resolves");

        let zero_threads = ExperimentConfig {
            thread_count: 0,
            ..config.clone()
        };
        assert!(matches!(
            zero_threads.validate(),
            Err(AppError::Validation(_))
        ));

        let dense = ExperimentConfig {
            bf_density: 1.5,
            ..config
        };
        assert!(matches!(dense.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn missing_optional_settings_file_yields_empty_settings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings =
            get_settings(&temp.path().join("absent.toml"), false).expect("optional file");

        assert!(settings.experiments.is_empty());
        assert!(settings.tools.is_none());
    }
}
