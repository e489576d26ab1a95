use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::pipeline::{PipelineStatistics, RunStatus};

/// Renders the markdown summary written once per invocation.
pub fn render_report(
    stats: &PipelineStatistics,
    repository: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let mut report = String::new();

    let _ = writeln!(report, "# Workflow Failure Analysis Report");
    let _ = writeln!(
        report,
        "**Generated:** {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(report, "**Repository:** {repository}\n");

    let _ = writeln!(report, "## Summary Statistics");
    let _ = writeln!(report, "- **Workflows Checked:** {}", stats.workflows_checked);
    let _ = writeln!(report, "- **Failed Workflows:** {}", stats.failed_workflows);
    let _ = writeln!(report, "- **Failed Jobs:** {}", stats.failed_jobs);
    let _ = writeln!(report, "- **Errors Analyzed:** {}", stats.errors_analyzed);
    let _ = writeln!(report, "- **Issues Created:** {}", stats.issues_created);
    let _ = writeln!(report, "- **Processing Errors:** {}\n", stats.processing_errors);

    let _ = writeln!(report, "## Analysis Results");
    match stats.status() {
        RunStatus::AllPassing => {
            let _ = writeln!(report, "✅ **All workflows are passing!** No failures detected.");
        }
        RunStatus::IssuesCreated => {
            let _ = writeln!(
                report,
                "🚨 **{} issues created** for workflow failures.",
                stats.issues_created
            );
            let _ = writeln!(
                report,
                "📋 Check the Issues tab for detailed analysis and resolution steps."
            );
        }
        RunStatus::FailuresWithoutIssues => {
            let _ = writeln!(
                report,
                "⚠️ **Failures detected but no issues created.** Check logs for details."
            );
        }
    }

    if stats.processing_errors > 0 {
        let _ = writeln!(
            report,
            "\n⚠️ **{} processing errors** occurred during analysis.",
            stats.processing_errors
        );
        let _ = writeln!(
            report,
            "Review the workflow logs for troubleshooting information."
        );
    }

    let _ = writeln!(report, "\n## Known Limitations");
    let _ = writeln!(
        report,
        "- Issues are not deduplicated: a failure that recurs across runs, or a re-run of this analysis, opens a new issue."
    );
    let _ = writeln!(
        report,
        "- Root-cause text comes from a language model and is unverified."
    );
    let _ = writeln!(
        report,
        "- Issue creation is not retried after a timeout or server error, so such a segment is counted as a processing error rather than risk a duplicate issue."
    );

    let _ = writeln!(report, "\n## Next Steps");
    let _ = writeln!(report, "1. Review created issues for priority and assignment");
    let _ = writeln!(report, "2. Implement suggested fixes from the analysis");
    let _ = writeln!(report, "3. Monitor workflow success rates after fixes");
    let _ = writeln!(report, "4. Update error patterns if new failure types emerge");

    let _ = writeln!(report, "\n---");
    let _ = writeln!(
        report,
        "*Generated by failtriage v{}*",
        env!("CARGO_PKG_VERSION")
    );

    report
}

/// Writes the report, creating missing parent directories.
pub fn write_report(path: &Path, report: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, report)?;
    Ok(())
}
