//! File-system layout of one experiment instance.

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use common::utils::config::ExperimentConfig;

const LUCENE_JAR: &str = "lucene-runner-1.0-SNAPSHOT.jar";
const MG4J_JAR: &str = "mg4j-1.0-SNAPSHOT-jar-with-dependencies.jar";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFunnelPaths {
    pub index_dir: PathBuf,
    pub repl_script: PathBuf,
    pub shard_definition: PathBuf,
    pub build_statistics_log: PathBuf,
    pub build_term_table_log: PathBuf,
    pub run_queries_log: PathBuf,
}

impl BitFunnelPaths {
    /// Working directory for the query run at `threads` threads.
    pub fn results_dir(&self, threads: usize) -> PathBuf {
        self.index_dir.join(format!("results-{threads}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LucenePaths {
    pub index_dir: PathBuf,
    pub classpath: PathBuf,
    pub build_index_log: PathBuf,
    pub run_queries_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mg4jPaths {
    pub index_dir: PathBuf,
    pub classpath: PathBuf,
    pub basename: PathBuf,
    pub build_index_log: PathBuf,
    pub filter_queries_log: PathBuf,
    pub run_queries_log: PathBuf,
    pub results: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PefPaths {
    pub index_dir: PathBuf,
    pub basename: PathBuf,
    pub collection: PathBuf,
    pub index_file: PathBuf,
    pub creator: PathBuf,
    pub runner: PathBuf,
    pub build_collection_log: PathBuf,
    pub build_index_log: PathBuf,
    pub run_queries_log: PathBuf,
    pub results: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPaths {
    pub dir: PathBuf,
    /// Normalized copy of the raw query log
    pub root_file: PathBuf,
    /// Queries whose terms all occur in the index, as text
    pub filtered_file: PathBuf,
    /// Same queries as term ids, consumed by the PEF runner
    pub pef_file: PathBuf,
}

/// Every path derived from an [`ExperimentConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentPaths {
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub run_report: PathBuf,
    pub bitfunnel: BitFunnelPaths,
    pub lucene: LucenePaths,
    pub mg4j: Mg4jPaths,
    pub pef: PefPaths,
    pub queries: QueryPaths,
}

fn suffixed(base: &OsStr, suffix: &str) -> OsString {
    let mut name = base.to_os_string();
    name.push(suffix);
    name
}

impl ExperimentPaths {
    /// Pure function of `config`; no file-system access.
    pub fn derive(config: &ExperimentConfig) -> Self {
        let basename = config.basename.as_str();
        let root = config.index_root.join(basename);

        let bf_dir = root.join("bitfunnel");
        let lucene_dir = root.join("lucene");
        let mg4j_dir = root.join("mg4j");
        let pef_dir = root.join("pef");
        let query_dir = root.join("queries");

        let query_name = config.queries.file_name().unwrap_or_default();

        Self {
            manifest: root.join(format!("{basename}-manifest.txt")),
            run_report: root.join(format!("{basename}-run-report.json")),
            bitfunnel: BitFunnelPaths {
                repl_script: bf_dir.join(format!("{basename}-repl.script")),
                shard_definition: bf_dir.join("ShardDefinition.csv"),
                build_statistics_log: bf_dir.join("build_bf_statistics_log.txt"),
                build_term_table_log: bf_dir.join("build_bf_term_table_log.txt"),
                run_queries_log: bf_dir.join("run_bf_queries_log.txt"),
                index_dir: bf_dir,
            },
            lucene: LucenePaths {
                classpath: config.tools.lucene_repo.join("target").join(LUCENE_JAR),
                build_index_log: lucene_dir.join("build_lucene_index_log.txt"),
                run_queries_log: lucene_dir.join("run_lucene_queries_log.txt"),
                index_dir: lucene_dir,
            },
            mg4j: Mg4jPaths {
                classpath: config.tools.mg4j_repo.join("target").join(MG4J_JAR),
                basename: mg4j_dir.join(basename),
                build_index_log: mg4j_dir.join("build_mg4j_index_log.txt"),
                filter_queries_log: mg4j_dir.join("filter_mg4j_queries_log.txt"),
                run_queries_log: mg4j_dir.join("run_mg4j_queries_log.txt"),
                results: mg4j_dir.join(suffixed(query_name, "-results.csv")),
                index_dir: mg4j_dir,
            },
            pef: PefPaths {
                basename: pef_dir.join(basename),
                collection: pef_dir.join(basename),
                index_file: pef_dir.join(format!(
                    "{basename}.index.{}",
                    config.pef_index_type
                )),
                creator: config.tools.pef_bin.join("create_freq_index"),
                runner: config.tools.pef_bin.join("Runner"),
                build_collection_log: pef_dir.join("build_pef_collection_log.txt"),
                build_index_log: pef_dir.join("build_pef_index_log.txt"),
                run_queries_log: pef_dir.join("run_pef_queries_log.txt"),
                results: pef_dir.join(suffixed(query_name, "-results.csv")),
                index_dir: pef_dir,
            },
            queries: QueryPaths {
                root_file: query_dir.join(query_name),
                filtered_file: query_dir.join(suffixed(query_name, "-in-index.txt")),
                pef_file: query_dir.join(suffixed(query_name, "-in-index-ints.txt")),
                dir: query_dir,
            },
            root,
        }
    }

    /// Labelled listing used by `--print-paths`.
    pub fn entries(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("root", self.root.as_path()),
            ("manifest", self.manifest.as_path()),
            ("run report", self.run_report.as_path()),
            ("query dir", self.queries.dir.as_path()),
            ("root query file", self.queries.root_file.as_path()),
            ("filtered query file", self.queries.filtered_file.as_path()),
            ("pef query file", self.queries.pef_file.as_path()),
            ("bitfunnel index", self.bitfunnel.index_dir.as_path()),
            ("bitfunnel repl script", self.bitfunnel.repl_script.as_path()),
            ("bitfunnel shard definition", self.bitfunnel.shard_definition.as_path()),
            ("bitfunnel statistics log", self.bitfunnel.build_statistics_log.as_path()),
            ("bitfunnel term table log", self.bitfunnel.build_term_table_log.as_path()),
            ("bitfunnel query log", self.bitfunnel.run_queries_log.as_path()),
            ("lucene index", self.lucene.index_dir.as_path()),
            ("lucene classpath", self.lucene.classpath.as_path()),
            ("lucene build log", self.lucene.build_index_log.as_path()),
            ("lucene query log", self.lucene.run_queries_log.as_path()),
            ("mg4j index", self.mg4j.index_dir.as_path()),
            ("mg4j classpath", self.mg4j.classpath.as_path()),
            ("mg4j basename", self.mg4j.basename.as_path()),
            ("mg4j build log", self.mg4j.build_index_log.as_path()),
            ("mg4j filter log", self.mg4j.filter_queries_log.as_path()),
            ("mg4j query log", self.mg4j.run_queries_log.as_path()),
            ("mg4j results", self.mg4j.results.as_path()),
            ("pef index", self.pef.index_dir.as_path()),
            ("pef basename", self.pef.basename.as_path()),
            ("pef index file", self.pef.index_file.as_path()),
            ("pef creator", self.pef.creator.as_path()),
            ("pef runner", self.pef.runner.as_path()),
            ("pef collection log", self.pef.build_collection_log.as_path()),
            ("pef build log", self.pef.build_index_log.as_path()),
            ("pef query log", self.pef.run_queries_log.as_path()),
            ("pef results", self.pef.results.as_path()),
        ]
    }
}

/// An experiment's base inputs together with the paths derived from them.
///
/// Both halves are private so they cannot drift apart; use
/// [`Experiment::reconfigure`] to change an input.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    paths: ExperimentPaths,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        let paths = ExperimentPaths::derive(&config);
        Self { config, paths }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    /// Copy of this experiment with `edit` applied to the base inputs and
    /// every path derived again.
    #[must_use]
    pub fn reconfigure(&self, edit: impl FnOnce(&mut ExperimentConfig)) -> Self {
        let mut config = self.config.clone();
        edit(&mut config);
        Self::new(config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::utils::config::ToolPaths;

    pub(crate) fn sample_config(index_root: &Path) -> ExperimentConfig {
        ExperimentConfig {
            name: "sample".to_string(),
            tools: ToolPaths {
                bitfunnel: PathBuf::from("/opt/bf/BitFunnel"),
                lucene_repo: PathBuf::from("/opt/LuceneRunner"),
                mg4j_repo: PathBuf::from("/opt/mg4j-workbench"),
                pef_bin: PathBuf::from("/opt/pef/bin"),
            },
            java: PathBuf::from("java"),
            index_root: index_root.to_path_buf(),
            basename: "273-150-100".to_string(),
            chunk_dir: PathBuf::from("/data/chunks-100-150"),
            chunk_pattern: "GX.*".to_string(),
            queries: PathBuf::from("/data/queries/06.efficiency_topics.all"),
            thread_count: 8,
            bf_density: 0.15,
            pef_index_type: "opt".to_string(),
            bf_treatment: "Optimal".to_string(),
        }
    }

    #[test]
    fn derive_lays_out_engine_directories_under_root() {
        let paths = ExperimentPaths::derive(&sample_config(Path::new("/idx")));
        let root = PathBuf::from("/idx/273-150-100");

        assert_eq!(paths.root, root);
        assert_eq!(paths.manifest, root.join("273-150-100-manifest.txt"));
        assert_eq!(paths.bitfunnel.index_dir, root.join("bitfunnel"));
        assert_eq!(paths.lucene.index_dir, root.join("lucene"));
        assert_eq!(paths.mg4j.index_dir, root.join("mg4j"));
        assert_eq!(paths.pef.index_dir, root.join("pef"));
        assert_eq!(paths.queries.dir, root.join("queries"));
        assert_eq!(
            paths.bitfunnel.repl_script,
            root.join("bitfunnel/273-150-100-repl.script")
        );
        assert_eq!(
            paths.bitfunnel.results_dir(3),
            root.join("bitfunnel/results-3")
        );
    }

    #[test]
    fn derive_names_query_and_result_files_after_query_log() {
        let paths = ExperimentPaths::derive(&sample_config(Path::new("/idx")));
        let root = PathBuf::from("/idx/273-150-100");

        assert_eq!(
            paths.queries.root_file,
            root.join("queries/06.efficiency_topics.all")
        );
        assert_eq!(
            paths.queries.filtered_file,
            root.join("queries/06.efficiency_topics.all-in-index.txt")
        );
        assert_eq!(
            paths.queries.pef_file,
            root.join("queries/06.efficiency_topics.all-in-index-ints.txt")
        );
        assert_eq!(
            paths.pef.results,
            root.join("pef/06.efficiency_topics.all-results.csv")
        );
        assert_eq!(
            paths.mg4j.results,
            root.join("mg4j/06.efficiency_topics.all-results.csv")
        );
    }

    #[test]
    fn derive_places_tool_artifacts_under_tool_locations() {
        let paths = ExperimentPaths::derive(&sample_config(Path::new("/idx")));

        assert_eq!(
            paths.mg4j.classpath,
            PathBuf::from("/opt/mg4j-workbench/target/mg4j-1.0-SNAPSHOT-jar-with-dependencies.jar")
        );
        assert_eq!(
            paths.lucene.classpath,
            PathBuf::from("/opt/LuceneRunner/target/lucene-runner-1.0-SNAPSHOT.jar")
        );
        assert_eq!(paths.pef.creator, PathBuf::from("/opt/pef/bin/create_freq_index"));
        assert_eq!(paths.pef.runner, PathBuf::from("/opt/pef/bin/Runner"));
        assert_eq!(
            paths.pef.index_file,
            PathBuf::from("/idx/273-150-100/pef/273-150-100.index.opt")
        );
    }

    #[test]
    fn derive_is_deterministic() {
        let config = sample_config(Path::new("/idx"));
        assert_eq!(ExperimentPaths::derive(&config), ExperimentPaths::derive(&config));

        let experiment = Experiment::new(config);
        let unchanged = experiment.reconfigure(|_| {});
        assert_eq!(experiment.paths(), unchanged.paths());
    }

    #[test]
    fn reconfigure_leaves_no_stale_paths() {
        let experiment = Experiment::new(sample_config(Path::new("/idx")));
        let moved = experiment.reconfigure(|config| {
            config.basename = "273-1000-1500".to_string();
            config.pef_index_type = "ef".to_string();
        });

        assert_eq!(
            moved.paths(),
            &ExperimentPaths::derive(moved.config())
        );
        for (label, path) in moved.paths().entries() {
            if path.starts_with("/idx") {
                assert!(
                    path.starts_with("/idx/273-1000-1500"),
                    "{label} still points at {}",
                    path.display()
                );
            }
        }
        assert!(moved
            .paths()
            .pef
            .index_file
            .ends_with("273-1000-1500.index.ef"));
        assert_eq!(experiment.config().basename, "273-150-100");
    }
}
