use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::auth::Token;
use crate::config::Config;
use crate::error::FailTriageError;
use crate::output::{print_summary, render_report, write_report};
use crate::pipeline::{FailurePipeline, PipelineStatistics};

#[derive(Parser)]
#[command(name = "failtriage")]
#[command(author, version, about = "Workflow Failure Analyzer", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GitHub token used for run history and issue creation
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Repository to analyse, as owner/repo
    #[arg(short, long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    /// API key for the completion service
    #[arg(long, env = "COMPLETION_API_KEY", hide_env_values = true)]
    analysis_api_key: Option<String>,

    /// Number of completed runs to inspect (overrides the config file)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Where to write the markdown report (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print final statistics as JSON to stdout
    #[arg(long, default_value_t = false)]
    json: bool,

    #[arg(short, long, default_value_t = false)]
    pretty: bool,
}

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No processing errors, whether or not failures were found
    Clean,
    /// At least one item failed during the batch
    ProcessingErrors,
    /// Initialisation failed before any analysis happened
    Fatal,
}

impl Outcome {
    pub fn from_statistics(stats: &PipelineStatistics) -> Self {
        if stats.processing_errors > 0 {
            Self::ProcessingErrors
        } else {
            Self::Clean
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::ProcessingErrors => 1,
            Self::Fatal => 2,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

struct Credentials {
    github_token: Token,
    repository: String,
    analysis_key: Token,
}

/// Checks that every credential is present and non-blank, naming all the
/// missing ones at once.
fn collect_credentials(
    github_token: Option<&str>,
    repository: Option<&str>,
    analysis_key: Option<&str>,
) -> std::result::Result<Credentials, FailTriageError> {
    let github_token = github_token.map(Token::from).filter(|t| !t.is_empty());
    let repository = repository.map(str::trim).filter(|r| !r.is_empty());
    let analysis_key = analysis_key.map(Token::from).filter(|t| !t.is_empty());

    match (github_token, repository, analysis_key) {
        (Some(github_token), Some(repository), Some(analysis_key)) => Ok(Credentials {
            github_token,
            repository: repository.to_string(),
            analysis_key,
        }),
        (github_token, repository, analysis_key) => {
            let missing = [
                ("GITHUB_TOKEN", github_token.is_none()),
                ("GITHUB_REPOSITORY", repository.is_none()),
                ("COMPLETION_API_KEY", analysis_key.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| name.to_string())
            .collect();
            Err(FailTriageError::MissingCredentials(missing))
        }
    }
}

impl Cli {
    fn load_config(&self) -> Config {
        let mut config = Config::load(self.config.as_deref());

        if let Some(limit) = self.limit {
            config.analyzer.max_runs = limit;
        }
        if let Some(output) = &self.output {
            config.report.path.clone_from(output);
        }

        config
    }

    fn print_statistics_json(&self, stats: &PipelineStatistics) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(stats)?
        } else {
            serde_json::to_string(stats)?
        };
        println!("{json_output}");
        Ok(())
    }

    /// Run the whole analysis.
    ///
    /// # Errors
    ///
    /// Only initialisation failures are returned; they map to
    /// [`Outcome::Fatal`]. Everything after initialisation is reflected in
    /// the statistics instead.
    pub async fn execute(&self) -> Result<Outcome> {
        let credentials = collect_credentials(
            self.github_token.as_deref(),
            self.repository.as_deref(),
            self.analysis_api_key.as_deref(),
        )?;
        info!("Environment validation completed successfully");

        let config = self.load_config();

        let pipeline = FailurePipeline::from_config(
            &config,
            &credentials.repository,
            credentials.github_token,
            credentials.analysis_key,
        )
        .context("Failed to initialize analyzer")?;

        let stats = pipeline.run().await;
        let mut outcome = Outcome::from_statistics(&stats);

        let report = render_report(&stats, pipeline.repository(), Utc::now());
        match write_report(&config.report.path, &report) {
            Ok(()) => info!("Report written to: {}", config.report.path.display()),
            Err(e) => {
                error!(
                    "Failed to write report to {}: {e}",
                    config.report.path.display()
                );
                outcome = Outcome::ProcessingErrors;
            }
        }

        if self.json {
            self.print_statistics_json(&stats)?;
        } else {
            print_summary(&stats, pipeline.repository());
        }

        match outcome {
            Outcome::Clean if stats.failed_workflows > 0 => {
                info!("Analysis completed - failures detected and processed");
            }
            Outcome::Clean => info!("Analysis completed - no failures detected"),
            _ => warn!("Analysis completed with errors"),
        }

        Ok(outcome)
    }
}
