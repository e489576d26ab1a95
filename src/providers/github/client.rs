use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

use crate::auth::Token;
use crate::config::GitHubConfig;
use crate::error::{FailTriageError, Result};

use super::types::{
    CreatedIssue, Job, NewIssue, PipelineRun, WorkflowJobsResponse, WorkflowRunsResponse,
};

const MAX_PAGE_SIZE: usize = 100;

/// Which failures a request may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Reads: network errors, 429 and 5xx
    Transient,
    /// Writes: only failures where the server cannot have acted on the
    /// request (connection refused, 429)
    Unsent,
}

/// GitHub REST client for run history, job logs and issue creation.
///
/// Every request carries the bearer token and the configured timeout. Reads
/// are retried with exponential backoff on network errors, 429 and 5xx.
/// Issue creation is only retried when the request never reached GitHub or
/// was rate limited, so a timed-out or 5xx POST is never sent twice. Other
/// 4xx responses fail immediately.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    repository: String,
    token: Token,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `config` - API base URL, timeout and retry budget
    /// * `repository` - Repository in `owner/repo` form
    /// * `token` - GitHub token used as bearer credential
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or repository path is malformed, or
    /// the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig, repository: &str, token: Token) -> Result<Self> {
        Url::parse(&config.api_url)
            .map_err(|e| FailTriageError::Config(format!("Invalid GitHub API URL: {e}")))?;

        let parts: Vec<&str> = repository.split('/').collect();
        if parts.len() != 2 || parts.iter().any(|part| part.is_empty()) {
            return Err(FailTriageError::Config(format!(
                "Repository must be in format 'owner/repo', got '{repository}'"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .user_agent(concat!("failtriage/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| FailTriageError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
            token,
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, self.repository, path)
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.as_str())
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(retry_count))
    }

    /// Send a request built by `build`, retrying failures allowed by `retry`.
    async fn send_with_retry<F>(&self, retry: Retry, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retry_count = 0;
        loop {
            let request = self.auth_request(build());

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e)
                    if e.is_connect()
                        || (retry == Retry::Transient && (e.is_timeout() || e.is_request())) =>
                {
                    if retry_count >= self.retry_attempts {
                        return Err(e.into());
                    }
                    let delay = self.backoff(retry_count);
                    warn!(
                        "Network error ({}), retrying in {}ms ({}/{})...",
                        e,
                        delay.as_millis(),
                        retry_count + 1,
                        self.retry_attempts
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || (retry == Retry::Transient && status.is_server_error());

            if retryable {
                if retry_count >= self.retry_attempts {
                    return Err(FailTriageError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.retry_attempts,
                    });
                }

                let delay = self.backoff(retry_count);
                warn!(
                    "GitHub API error (status {status}). Waiting {}ms before retry {}/{}...",
                    delay.as_millis(),
                    retry_count + 1,
                    self.retry_attempts
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(FailTriageError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }
    }

    /// Fetch the most recent completed workflow runs, newest first.
    ///
    /// Pages through the listing until `limit` runs are collected or the
    /// listing is exhausted.
    pub async fn list_recent_runs(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let url = self.repo_url("actions/runs");
        let per_page = MAX_PAGE_SIZE.min(limit.max(1));
        let mut all_runs = Vec::new();
        let mut page = 1;

        while all_runs.len() < limit {
            let query = [
                ("status", "completed".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ];

            let response: WorkflowRunsResponse = self
                .send_with_retry(Retry::Transient, || self.client.get(&url).query(&query))
                .await?
                .json()
                .await?;

            let fetched = response.workflow_runs.len();
            debug!("Fetched page {page} with {fetched} workflow runs");
            all_runs.extend(response.workflow_runs);

            if fetched < per_page {
                break;
            }
            page += 1;
        }

        all_runs.truncate(limit);
        info!("Retrieved {} workflow runs", all_runs.len());

        Ok(all_runs)
    }

    /// Fetch every job of a workflow run, following pagination.
    pub async fn list_jobs(&self, run_id: u64) -> Result<Vec<Job>> {
        let url = self.repo_url(&format!("actions/runs/{run_id}/jobs"));
        let mut all_jobs = Vec::new();
        let mut page = 1;

        loop {
            let query = [
                ("per_page", MAX_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];

            let response: WorkflowJobsResponse = self
                .send_with_retry(Retry::Transient, || self.client.get(&url).query(&query))
                .await?
                .json()
                .await?;

            let fetched = response.jobs.len();
            debug!("Fetched page {page} with {fetched} jobs for run {run_id}");
            all_jobs.extend(response.jobs);

            if fetched < MAX_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        info!("Retrieved {} jobs for run {run_id}", all_jobs.len());
        Ok(all_jobs)
    }

    /// Fetch the raw log text of a job.
    pub async fn get_job_log(&self, job_id: u64) -> Result<String> {
        let url = self.repo_url(&format!("actions/jobs/{job_id}/logs"));

        let logs = self
            .send_with_retry(Retry::Transient, || self.client.get(&url))
            .await?
            .text()
            .await?;

        info!("Retrieved logs for job {job_id} ({} characters)", logs.len());
        Ok(logs)
    }

    /// Open a new issue in the repository.
    pub async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        let url = self.repo_url("issues");

        let created: CreatedIssue = self
            .send_with_retry(Retry::Unsent, || self.client.post(&url).json(issue))
            .await?
            .json()
            .await?;

        Ok(created)
    }
}
