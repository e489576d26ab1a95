use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use serde::Serialize;

use crate::analyzer::RootCauseAnalyzer;
use crate::auth::Token;
use crate::config::Config;
use crate::error::Result;
use crate::extract::{ContextWindow, SegmentExtractor};
use crate::output::PhaseProgress;
use crate::patterns::PatternSet;
use crate::providers::github::types::{Job, PipelineRun};
use crate::providers::GitHubClient;
use crate::publisher::IssuePublisher;

/// Counters collected over one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatistics {
    pub workflows_checked: usize,
    pub failed_workflows: usize,
    pub failed_jobs: usize,
    pub errors_analyzed: usize,
    pub issues_created: usize,
    pub processing_errors: usize,
}

/// Qualitative outcome shown in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    AllPassing,
    IssuesCreated,
    FailuresWithoutIssues,
}

impl PipelineStatistics {
    pub fn status(&self) -> RunStatus {
        if self.failed_workflows == 0 {
            RunStatus::AllPassing
        } else if self.issues_created > 0 {
            RunStatus::IssuesCreated
        } else {
            RunStatus::FailuresWithoutIssues
        }
    }

    fn absorb(&mut self, tally: &Self) {
        self.failed_jobs += tally.failed_jobs;
        self.errors_analyzed += tally.errors_analyzed;
        self.issues_created += tally.issues_created;
        self.processing_errors += tally.processing_errors;
    }
}

/// End-to-end failure analysis: runs, failed runs, failed jobs, logs,
/// segments, analyses, issues.
///
/// A failure while handling one run, job or segment is logged, counted in
/// `processing_errors` and the batch moves on to the next sibling. Runs are
/// independent; with `concurrency > 1` they are processed concurrently and
/// each returns its own tally, folded into the totals in one place.
pub struct FailurePipeline {
    history: GitHubClient,
    extractor: SegmentExtractor,
    analyzer: RootCauseAnalyzer,
    publisher: IssuePublisher,
    max_runs: usize,
    max_errors_per_job: usize,
    concurrency: usize,
}

impl FailurePipeline {
    /// Wire up every stage from configuration and credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if a service URL, the repository path or an HTTP
    /// client is invalid. No network call is made here.
    pub fn from_config(
        config: &Config,
        repository: &str,
        github_token: Token,
        analysis_key: Token,
    ) -> Result<Self> {
        let history = GitHubClient::new(&config.github, repository, github_token)?;
        let analyzer = RootCauseAnalyzer::new(&config.analysis_service, analysis_key)?;
        let patterns = PatternSet::compile(&config.pattern_sources());
        if patterns.is_empty() {
            warn!("No valid error patterns, no errors will be extracted");
        } else {
            info!("Using {} error patterns", patterns.len());
        }
        let extractor = SegmentExtractor::new(patterns, ContextWindow::from(&config.analyzer));

        info!(
            "Initialized analyzer for repository: {repository} (max runs={}, max errors per job={})",
            config.analyzer.max_runs, config.analyzer.max_errors_per_job
        );

        Ok(Self {
            publisher: IssuePublisher::new(history.clone()),
            history,
            extractor,
            analyzer,
            max_runs: config.analyzer.max_runs,
            max_errors_per_job: config.analyzer.max_errors_per_job,
            concurrency: config.analyzer.concurrency.max(1),
        })
    }

    pub fn repository(&self) -> &str {
        self.history.repository()
    }

    /// Process the configured scan window. Always returns statistics, even
    /// when every stage failed.
    pub async fn run(&self) -> PipelineStatistics {
        let mut stats = PipelineStatistics::default();

        info!("Starting workflow failure analysis...");
        let progress = PhaseProgress::start_phase_1(self.max_runs);

        let runs = match self.history.list_recent_runs(self.max_runs).await {
            Ok(runs) => runs,
            Err(e) => {
                error!("Failed to fetch workflow runs: {e}");
                stats.processing_errors += 1;
                progress.abort("Could not fetch workflow runs");
                return stats;
            }
        };
        stats.workflows_checked = runs.len();

        if runs.is_empty() {
            warn!("No workflow runs found");
            progress.finish_phase_1(0, 0);
            return stats;
        }

        let failed_runs: Vec<PipelineRun> = runs.into_iter().filter(PipelineRun::is_failure).collect();
        stats.failed_workflows = failed_runs.len();
        info!("Identified {} failed workflows", failed_runs.len());

        if failed_runs.is_empty() {
            info!("No failed workflows found");
            progress.finish_phase_1(stats.workflows_checked, 0);
            return stats;
        }

        let progress =
            progress.finish_phase_1_start_phase_2(stats.workflows_checked, failed_runs.len());

        let tallies: Vec<PipelineStatistics> = stream::iter(&failed_runs)
            .map(|run| self.process_run(run))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for tally in &tallies {
            stats.absorb(tally);
        }

        progress.finish_phase_2(stats.errors_analyzed, stats.issues_created);
        info!("Workflow failure analysis completed: {stats:?}");

        stats
    }

    async fn process_run(&self, run: &PipelineRun) -> PipelineStatistics {
        let mut tally = PipelineStatistics::default();
        info!(
            "Processing failed workflow: {} (ID: {})",
            run.display_name(),
            run.id
        );

        let jobs = match self.history.list_jobs(run.id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to fetch jobs for run {}: {e}", run.id);
                tally.processing_errors += 1;
                return tally;
            }
        };

        for job in jobs.iter().filter(|job| job.is_failure()) {
            tally.failed_jobs += 1;
            if let Err(e) = self.process_job(run, job, &mut tally).await {
                error!(
                    "Error processing job {} ({}) in run {}: {e}",
                    job.display_name(),
                    job.id,
                    run.id
                );
                tally.processing_errors += 1;
            }
        }

        tally
    }

    async fn process_job(
        &self,
        run: &PipelineRun,
        job: &Job,
        tally: &mut PipelineStatistics,
    ) -> Result<()> {
        info!(
            "Analyzing failed job: {} ({}) of run {}",
            job.display_name(),
            job.id,
            job.run_id
        );

        let logs = self.history.get_job_log(job.id).await?;
        if logs.trim().is_empty() {
            warn!("No logs available for job {}", job.id);
            return Ok(());
        }

        let mut segments = self.extractor.extract(&logs);
        if segments.len() > self.max_errors_per_job {
            warn!(
                "Job {} has {} error segments, analyzing the first {}",
                job.id,
                segments.len(),
                self.max_errors_per_job
            );
            segments.truncate(self.max_errors_per_job);
        }

        for segment in &segments {
            info!(
                "Analyzing error at line {} of job {}",
                segment.line_number, job.id
            );

            let analysis = self
                .analyzer
                .analyze(segment, run.display_name(), job.display_name())
                .await;
            tally.errors_analyzed += 1;
            if analysis.is_fallback() {
                warn!(
                    "Using fallback analysis for run {} job {} line {}",
                    run.id, job.id, segment.line_number
                );
            }

            if self.publisher.publish(run, job, segment, &analysis).await {
                tally.issues_created += 1;
            } else {
                tally.processing_errors += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Mock, Server, ServerGuard};

    const RUNS_PATH: &str = "/repos/octo/widgets/actions/runs";

    fn config_for(github: &ServerGuard, analysis_url: String) -> Config {
        let mut config = Config::default();
        config.github.api_url = github.url();
        config.github.retry_attempts = 0;
        config.github.retry_backoff_ms = 0;
        config.github.timeout_seconds = 5;
        config.analysis_service.api_url = analysis_url;
        config.analysis_service.timeout_seconds = 5;
        config
    }

    fn pipeline(config: &Config) -> FailurePipeline {
        FailurePipeline::from_config(
            config,
            "octo/widgets",
            Token::from("ghp_test"),
            Token::from("maas-key"),
        )
        .unwrap()
    }

    fn run_json(id: u64, conclusion: &str) -> String {
        format!(
            r#"{{"id": {id}, "name": "CI {id}", "conclusion": "{conclusion}", "head_branch": "main",
                "head_sha": "0123456789abcdef", "actor": {{"login": "octocat"}}, "event": "push",
                "html_url": "https://github.com/octo/widgets/actions/runs/{id}",
                "updated_at": "2024-01-15T10:30:00Z"}}"#
        )
    }

    async fn mock_runs(server: &mut ServerGuard, runs: &[(u64, &str)]) -> Mock {
        let body = runs
            .iter()
            .map(|(id, conclusion)| run_json(*id, conclusion))
            .collect::<Vec<_>>()
            .join(",");
        server
            .mock("GET", RUNS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"workflow_runs": [{body}]}}"#))
            .create_async()
            .await
    }

    async fn mock_jobs(server: &mut ServerGuard, run_id: u64, jobs: &[(u64, &str)]) -> Mock {
        let body = jobs
            .iter()
            .map(|(id, conclusion)| {
                format!(r#"{{"id": {id}, "name": "job {id}", "run_id": {run_id}, "conclusion": "{conclusion}"}}"#)
            })
            .collect::<Vec<_>>()
            .join(",");
        server
            .mock("GET", format!("{RUNS_PATH}/{run_id}/jobs").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"jobs": [{body}]}}"#))
            .create_async()
            .await
    }

    async fn mock_log(server: &mut ServerGuard, job_id: u64, status: usize, log: &str) -> Mock {
        server
            .mock(
                "GET",
                format!("/repos/octo/widgets/actions/jobs/{job_id}/logs").as_str(),
            )
            .with_status(status)
            .with_body(log)
            .create_async()
            .await
    }

    async fn mock_issues(server: &mut ServerGuard, status: usize, hits: usize) -> Mock {
        server
            .mock("POST", "/repos/octo/widgets/issues")
            .with_status(status)
            .with_body(r#"{"number": 1, "html_url": "https://github.com/octo/widgets/issues/1"}"#)
            .expect(hits)
            .create_async()
            .await
    }

    async fn analysis_server() -> ServerGuard {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"text": "ROOT CAUSE: disk full"}]}"#)
            .create_async()
            .await;
        server
    }

    /// Two distinct errors plus a repeat of the first one.
    fn log_with_two_errors() -> String {
        let mut lines: Vec<String> = (0..40).map(|i| format!("step {i} ok")).collect();
        lines[0] = "FATAL: disk quota exceeded".to_string();
        lines[2] = "FATAL: disk quota exceeded".to_string();
        lines[30] = "Exception: connection reset by peer".to_string();
        lines.join("\n")
    }

    #[tokio::test]
    async fn test_end_to_end_counts() {
        let mut github = Server::new_async().await;
        let analysis = analysis_server().await;

        mock_runs(&mut github, &[(1, "success"), (2, "failure"), (3, "cancelled")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure"), (21, "success")]).await;
        mock_log(&mut github, 20, 200, &log_with_two_errors()).await;
        let issues = mock_issues(&mut github, 201, 2).await;

        let config = config_for(&github, analysis.url());
        let stats = pipeline(&config).run().await;

        issues.assert_async().await;
        assert_eq!(
            stats,
            PipelineStatistics {
                workflows_checked: 3,
                failed_workflows: 1,
                failed_jobs: 1,
                errors_analyzed: 2,
                issues_created: 2,
                processing_errors: 0,
            }
        );
        assert_eq!(stats.status(), RunStatus::IssuesCreated);
    }

    #[tokio::test]
    async fn test_publish_failure_counts_one_processing_error() {
        let mut github = Server::new_async().await;
        let analysis = analysis_server().await;

        mock_runs(&mut github, &[(2, "failure")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure")]).await;
        mock_log(&mut github, 20, 200, "setup\nFATAL: disk quota exceeded\nteardown").await;
        mock_issues(&mut github, 500, 1).await;

        let config = config_for(&github, analysis.url());
        let stats = pipeline(&config).run().await;

        assert_eq!(stats.errors_analyzed, 1);
        assert_eq!(stats.issues_created, 0);
        assert_eq!(stats.processing_errors, 1);
        assert_eq!(stats.status(), RunStatus::FailuresWithoutIssues);
    }

    #[tokio::test]
    async fn test_run_listing_failure_still_returns_statistics() {
        let mut github = Server::new_async().await;
        github
            .mock("GET", RUNS_PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let config = config_for(&github, "http://127.0.0.1:9".to_string());
        let stats = pipeline(&config).run().await;

        assert_eq!(stats.workflows_checked, 0);
        assert_eq!(stats.processing_errors, 1);
    }

    #[tokio::test]
    async fn test_no_runs_skips_to_reporting() {
        let mut github = Server::new_async().await;
        mock_runs(&mut github, &[]).await;

        let config = config_for(&github, "http://127.0.0.1:9".to_string());
        let stats = pipeline(&config).run().await;

        assert_eq!(stats, PipelineStatistics::default());
        assert_eq!(stats.status(), RunStatus::AllPassing);
    }

    #[tokio::test]
    async fn test_job_listing_failure_moves_to_next_run() {
        let mut github = Server::new_async().await;
        let analysis = analysis_server().await;

        mock_runs(&mut github, &[(2, "failure"), (3, "failure")]).await;
        github
            .mock("GET", format!("{RUNS_PATH}/2/jobs").as_str())
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        mock_jobs(&mut github, 3, &[(30, "failure")]).await;
        mock_log(&mut github, 30, 200, "CRITICAL: out of memory").await;
        mock_issues(&mut github, 201, 1).await;

        let config = config_for(&github, analysis.url());
        let stats = pipeline(&config).run().await;

        assert_eq!(stats.failed_workflows, 2);
        assert_eq!(stats.issues_created, 1);
        assert_eq!(stats.processing_errors, 1);
    }

    #[tokio::test]
    async fn test_log_failures_and_empty_logs() {
        let mut github = Server::new_async().await;

        mock_runs(&mut github, &[(2, "failure")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure"), (21, "failure")]).await;
        mock_log(&mut github, 20, 410, "gone").await;
        mock_log(&mut github, 21, 200, "").await;

        let config = config_for(&github, "http://127.0.0.1:9".to_string());
        let stats = pipeline(&config).run().await;

        assert_eq!(stats.failed_jobs, 2);
        assert_eq!(stats.errors_analyzed, 0);
        // Only the failed fetch counts; an empty log is a valid outcome.
        assert_eq!(stats.processing_errors, 1);
    }

    #[tokio::test]
    async fn test_analysis_outage_still_files_issues() {
        let mut github = Server::new_async().await;

        mock_runs(&mut github, &[(2, "failure")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure")]).await;
        mock_log(&mut github, 20, 200, "FATAL: disk quota exceeded").await;
        let issues = github
            .mock("POST", "/repos/octo/widgets/issues")
            .match_body(Matcher::Regex("Manual review required".to_string()))
            .with_status(201)
            .with_body(r#"{"number": 5}"#)
            .expect(1)
            .create_async()
            .await;

        let config = config_for(&github, "http://127.0.0.1:9".to_string());
        let stats = pipeline(&config).run().await;

        issues.assert_async().await;
        assert_eq!(stats.errors_analyzed, 1);
        assert_eq!(stats.issues_created, 1);
        assert_eq!(stats.processing_errors, 0);
    }

    #[tokio::test]
    async fn test_segments_per_job_are_capped() {
        let mut github = Server::new_async().await;
        let analysis = analysis_server().await;

        mock_runs(&mut github, &[(2, "failure")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure")]).await;
        mock_log(&mut github, 20, 200, &log_with_two_errors()).await;
        mock_issues(&mut github, 201, 1).await;

        let mut config = config_for(&github, analysis.url());
        config.analyzer.max_errors_per_job = 1;
        let stats = pipeline(&config).run().await;

        assert_eq!(stats.errors_analyzed, 1);
        assert_eq!(stats.issues_created, 1);
    }

    async fn run_identical_failures(concurrency: usize) -> PipelineStatistics {
        let mut github = Server::new_async().await;
        let analysis = analysis_server().await;

        mock_runs(&mut github, &[(2, "failure"), (3, "failure")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure")]).await;
        mock_jobs(&mut github, 3, &[(30, "failure")]).await;
        mock_log(&mut github, 20, 200, &log_with_two_errors()).await;
        mock_log(&mut github, 30, 200, &log_with_two_errors()).await;
        let issues = mock_issues(&mut github, 201, 4).await;

        let mut config = config_for(&github, analysis.url());
        config.analyzer.concurrency = concurrency;
        let stats = pipeline(&config).run().await;

        issues.assert_async().await;
        stats
    }

    #[tokio::test]
    async fn test_identical_logs_across_runs_are_not_merged() {
        for concurrency in [1, 4] {
            let stats = run_identical_failures(concurrency).await;

            assert_eq!(stats.failed_jobs, 2, "concurrency {concurrency}");
            assert_eq!(stats.errors_analyzed, 4, "concurrency {concurrency}");
            assert_eq!(stats.issues_created, 4, "concurrency {concurrency}");
            assert_eq!(stats.processing_errors, 0, "concurrency {concurrency}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_aggregate_like_sequential() {
        let mut github = Server::new_async().await;
        let analysis = analysis_server().await;

        mock_runs(&mut github, &[(2, "failure"), (3, "failure"), (4, "success")]).await;
        mock_jobs(&mut github, 2, &[(20, "failure")]).await;
        mock_jobs(&mut github, 3, &[(30, "failure")]).await;
        mock_log(&mut github, 20, 200, &log_with_two_errors()).await;
        mock_log(&mut github, 30, 200, "CRITICAL: out of memory").await;
        mock_issues(&mut github, 201, 3).await;

        let mut config = config_for(&github, analysis.url());
        config.analyzer.concurrency = 4;
        let stats = pipeline(&config).run().await;

        assert_eq!(stats.workflows_checked, 3);
        assert_eq!(stats.failed_workflows, 2);
        assert_eq!(stats.errors_analyzed, 3);
        assert_eq!(stats.issues_created, 3);
        assert_eq!(stats.processing_errors, 0);
    }
}
