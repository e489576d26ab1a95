use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final outcome of a completed run or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    #[serde(other)]
    Other,
}

/// User that triggered a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

/// GitHub Actions workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique identifier for the workflow run
    pub id: u64,
    /// Name of the workflow
    pub name: Option<String>,
    /// Conclusion of the run (success, failure, etc.)
    pub conclusion: Option<Conclusion>,
    /// Head branch or tag name
    pub head_branch: Option<String>,
    /// SHA of the head commit
    #[serde(default)]
    pub head_sha: String,
    /// User that triggered the run
    pub actor: Option<Actor>,
    /// Event that triggered the run
    #[serde(default)]
    pub event: String,
    /// Web page of the run
    #[serde(default)]
    pub html_url: String,
    /// When the run was last updated
    pub updated_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Workflow")
    }

    pub fn is_failure(&self) -> bool {
        self.conclusion == Some(Conclusion::Failure)
    }

    pub fn short_sha(&self) -> &str {
        match self.head_sha.char_indices().nth(8) {
            Some((index, _)) => &self.head_sha[..index],
            None if self.head_sha.is_empty() => "unknown",
            None => &self.head_sha,
        }
    }

    pub fn branch(&self) -> &str {
        self.head_branch.as_deref().unwrap_or("unknown")
    }

    pub fn actor_login(&self) -> &str {
        self.actor
            .as_ref()
            .map_or("unknown", |actor| actor.login.as_str())
    }
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for the job
    pub id: u64,
    /// Name of the job
    #[serde(default)]
    pub name: String,
    /// Run this job belongs to
    #[serde(default)]
    pub run_id: u64,
    /// Conclusion of the job
    pub conclusion: Option<Conclusion>,
}

impl Job {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unknown Job"
        } else {
            &self.name
        }
    }

    pub fn is_failure(&self) -> bool {
        self.conclusion == Some(Conclusion::Failure)
    }
}

/// Payload for the issue creation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// The part of the created issue we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub html_url: Option<String>,
}

/// Response from GitHub API for workflow runs.
#[derive(Deserialize)]
pub(super) struct WorkflowRunsResponse {
    #[serde(default)]
    pub workflow_runs: Vec<PipelineRun>,
}

/// Response from GitHub API for workflow jobs.
#[derive(Deserialize)]
pub(super) struct WorkflowJobsResponse {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_deserializes_with_unknown_conclusion() {
        let run: PipelineRun = serde_json::from_str(
            r#"{
                "id": 42,
                "name": "CI",
                "conclusion": "timed_out",
                "head_branch": "main",
                "head_sha": "abc123def4567890",
                "actor": {"login": "octocat"},
                "event": "push",
                "html_url": "https://github.com/o/r/actions/runs/42",
                "updated_at": "2024-01-15T10:30:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(run.conclusion, Some(Conclusion::Other));
        assert!(!run.is_failure());
        assert_eq!(run.short_sha(), "abc123de");
        assert_eq!(run.actor_login(), "octocat");
    }

    #[test]
    fn test_run_defaults_for_missing_fields() {
        let run: PipelineRun =
            serde_json::from_str(r#"{"id": 7, "conclusion": null}"#).unwrap();

        assert_eq!(run.display_name(), "Unknown Workflow");
        assert_eq!(run.branch(), "unknown");
        assert_eq!(run.short_sha(), "unknown");
        assert_eq!(run.actor_login(), "unknown");
        assert!(run.conclusion.is_none());
    }

    #[test]
    fn test_failed_job() {
        let job: Job =
            serde_json::from_str(r#"{"id": 9, "name": "build", "run_id": 7, "conclusion": "failure"}"#)
                .unwrap();
        assert!(job.is_failure());
        assert_eq!(job.display_name(), "build");
    }
}
