use log::{error, info};

use crate::analyzer::Analysis;
use crate::error::Result;
use crate::extract::ErrorSegment;
use crate::providers::github::types::{CreatedIssue, Job, NewIssue, PipelineRun};
use crate::providers::GitHubClient;

const TITLE_ERROR_CHARS: usize = 80;
const MAX_LABEL_CHARS: usize = 50;
const BASE_LABELS: [&str; 3] = ["workflow-failure", "automated-analysis", "needs-investigation"];

/// Files one tracking issue per analysed error segment.
///
/// Issues are not deduplicated: publishing the same failure twice opens two
/// issues.
pub struct IssuePublisher {
    github: GitHubClient,
}

impl IssuePublisher {
    pub fn new(github: GitHubClient) -> Self {
        Self { github }
    }

    /// Create the issue, reporting success as a boolean.
    ///
    /// Failures are logged with run, job and line so they can be traced, and
    /// never propagate.
    pub async fn publish(
        &self,
        run: &PipelineRun,
        job: &Job,
        segment: &ErrorSegment,
        analysis: &Analysis,
    ) -> bool {
        match self.try_publish(run, job, segment, analysis).await {
            Ok(issue) => {
                info!(
                    "Created issue #{} for run {} job {} line {} ({})",
                    issue.number,
                    run.id,
                    job.id,
                    segment.line_number,
                    issue.html_url.as_deref().unwrap_or("no url")
                );
                true
            }
            Err(e) => {
                error!(
                    "Failed to create issue for run {} job {} line {}: {e}",
                    run.id, job.id, segment.line_number
                );
                false
            }
        }
    }

    async fn try_publish(
        &self,
        run: &PipelineRun,
        job: &Job,
        segment: &ErrorSegment,
        analysis: &Analysis,
    ) -> Result<CreatedIssue> {
        let issue = render_issue(run, job, segment, analysis);
        self.github.create_issue(&issue).await
    }
}

/// Build the full issue payload. Output depends only on the inputs.
pub fn render_issue(
    run: &PipelineRun,
    job: &Job,
    segment: &ErrorSegment,
    analysis: &Analysis,
) -> NewIssue {
    NewIssue {
        title: render_title(run, job, segment),
        body: render_body(run, job, segment, analysis),
        labels: labels_for(run),
    }
}

pub fn render_title(run: &PipelineRun, job: &Job, segment: &ErrorSegment) -> String {
    format!(
        "Workflow Failure: {} - {} - {}",
        run.display_name(),
        job.display_name(),
        truncate_with_ellipsis(&segment.error_line, TITLE_ERROR_CHARS)
    )
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

pub fn render_body(
    run: &PipelineRun,
    job: &Job,
    segment: &ErrorSegment,
    analysis: &Analysis,
) -> String {
    let failed_at = run
        .updated_at
        .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());

    format!(
        r"## Workflow Failure Analysis

**Workflow:** {workflow}
**Job:** {job}
**Run ID:** {run_id}
**Failed At:** {failed_at}
**Run URL:** {run_url}

### Error Details
**Line:** {line}
**Pattern:** `{pattern}` ({group})
**Error:** `{error_line}`

### Error Context
{fence}
{context}
{fence}

### AI Analysis ({backend})
{analysis}
{analysis_notes}
### Workflow Information
- **Branch:** {branch}
- **Commit:** {commit}
- **Actor:** {actor}
- **Event:** {event}

### Next Steps
- [ ] Review the error analysis above
- [ ] Implement the suggested solution
- [ ] Test the fix locally
- [ ] Verify the workflow passes after fix
- [ ] Close this issue once resolved

---
*This issue was automatically created by failtriage*
",
        workflow = run.display_name(),
        job = job.display_name(),
        run_id = run.id,
        run_url = run.html_url,
        line = segment.line_number,
        pattern = segment.pattern,
        group = segment.pattern_group,
        error_line = segment.error_line,
        fence = code_fence(&segment.context),
        context = segment.context,
        backend = analysis.backend,
        analysis = analysis.text,
        analysis_notes = analysis_notes(analysis),
        branch = run.branch(),
        commit = run.short_sha(),
        actor = run.actor_login(),
        event = if run.event.is_empty() { "unknown" } else { run.event.as_str() },
    )
}

/// Backtick fence longer than any backtick run inside `text`.
fn code_fence(text: &str) -> String {
    let longest_run = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest_run.max(2) + 1)
}

fn analysis_notes(analysis: &Analysis) -> String {
    let mut notes = String::new();
    if let Some(reason) = &analysis.failure {
        notes.push_str(&format!("\n> Analysis service error: {reason}\n"));
    }
    if let (Some(prompt), Some(completion)) = (analysis.prompt_tokens, analysis.completion_tokens) {
        notes.push_str(&format!("\n*Tokens: {prompt} prompt / {completion} completion*\n"));
    }
    notes
}

pub fn labels_for(run: &PipelineRun) -> Vec<String> {
    let mut labels: Vec<String> = BASE_LABELS.iter().map(|l| (*l).to_string()).collect();
    labels.push(workflow_label(run.display_name()));
    labels
}

fn workflow_label(workflow_name: &str) -> String {
    let slug = workflow_name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("workflow:{slug}").chars().take(MAX_LABEL_CHARS).collect()
}
