use anyhow::Result;
use common::utils::process::{ToolCommand, ToolRun, ToolRunner};

use super::{ensure_dir, execute, java};
use crate::paths::Experiment;

const INDEX_BUILDER: &str = "org.bitfunnel.runner.IndexBuilder";
const QUERY_RUNNER: &str = "org.bitfunnel.runner.LuceneRunner";

pub fn build_index_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    java(experiment, &paths.lucene.classpath, INDEX_BUILDER)
        .arg(&paths.lucene.index_dir)
        .arg(&paths.manifest)
        .arg(experiment.config().thread_count.to_string())
}

pub fn run_queries_command(experiment: &Experiment) -> ToolCommand {
    let paths = experiment.paths();
    java(experiment, &paths.lucene.classpath, QUERY_RUNNER)
        .arg(&paths.lucene.index_dir)
        .arg(&paths.queries.filtered_file)
        .arg(experiment.config().thread_count.to_string())
}

pub async fn build_index(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.lucene.index_dir)?;
    execute(
        runner,
        build_index_command(experiment),
        &paths.lucene.build_index_log,
    )
    .await
}

pub async fn run_queries(experiment: &Experiment, runner: &dyn ToolRunner) -> Result<ToolRun> {
    let paths = experiment.paths();
    ensure_dir(&paths.lucene.index_dir)?;
    execute(
        runner,
        run_queries_command(experiment),
        &paths.lucene.run_queries_log,
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{engines::testing::RecordingRunner, paths::tests::sample_config};
    use tempfile::tempdir;

    #[test]
    fn commands_point_at_runner_jar() {
        let experiment = Experiment::new(sample_config(Path::new("/idx")));

        assert_eq!(
            build_index_command(&experiment).to_string(),
            "java -cp /opt/LuceneRunner/target/lucene-runner-1.0-SNAPSHOT.jar \
             org.bitfunnel.runner.IndexBuilder /idx/273-150-100/lucene \
             /idx/273-150-100/273-150-100-manifest.txt 8"
        );
        assert_eq!(
            run_queries_command(&experiment).to_string(),
            "java -cp /opt/LuceneRunner/target/lucene-runner-1.0-SNAPSHOT.jar \
             org.bitfunnel.runner.LuceneRunner /idx/273-150-100/lucene \
             /idx/273-150-100/queries/06.efficiency_topics.all-in-index.txt 8"
        );
    }

    #[tokio::test]
    async fn build_and_run_write_separate_logs() -> Result<()> {
        let temp = tempdir()?;
        let experiment = Experiment::new(sample_config(temp.path()));
        let runner = RecordingRunner::default();

        let build = build_index(&experiment, &runner).await?;
        let run = run_queries(&experiment, &runner).await?;

        assert_ne!(build.log, run.log);
        assert_eq!(build.log.as_ref(), Some(&experiment.paths().lucene.build_index_log));
        assert_eq!(run.log.as_ref(), Some(&experiment.paths().lucene.run_queries_log));
        Ok(())
    }
}
