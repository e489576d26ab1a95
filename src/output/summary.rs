use std::fmt::Write;

use comfy_table::Cell;

use crate::pipeline::{PipelineStatistics, RunStatus};

use super::theme::{accent, count_cell, heading, muted, paint, stats_table, Tone};

/// Prints a color-coded summary of one analysis session to stdout.
pub fn print_summary(stats: &PipelineStatistics, repository: &str) {
    println!("{}", render_summary(stats, repository));
}

fn render_summary(stats: &PipelineStatistics, repository: &str) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{} {}", heading("📊"), heading("Overview"));
    let _ = writeln!(output, "  {} {}\n", muted("Repository:"), accent(repository));

    let rows = [
        ("Workflows checked", stats.workflows_checked, Tone::Good),
        ("Failed workflows", stats.failed_workflows, Tone::Attention),
        ("Failed jobs", stats.failed_jobs, Tone::Attention),
        ("Errors analyzed", stats.errors_analyzed, Tone::Good),
        ("Issues created", stats.issues_created, Tone::Good),
        ("Processing errors", stats.processing_errors, Tone::Problem),
    ];

    let mut table = stats_table();
    for (stage, count, tone) in rows {
        table.add_row(vec![Cell::new(stage), count_cell(count, tone)]);
    }
    let _ = writeln!(output, "{table}\n");

    let status = match stats.status() {
        RunStatus::AllPassing => paint("All workflows are passing", Tone::Good),
        RunStatus::IssuesCreated => paint(
            format!("{} issues created", stats.issues_created),
            Tone::Attention,
        ),
        RunStatus::FailuresWithoutIssues => {
            paint("Failures detected but no issues created", Tone::Problem)
        }
    };
    let _ = writeln!(output, "  {} {}", muted("Status:"), status);

    if stats.processing_errors > 0 {
        let _ = writeln!(
            output,
            "  {} {}",
            muted("Warning:"),
            paint(
                format!(
                    "{} processing errors, see logs (RUST_LOG=info) for details",
                    stats.processing_errors
                ),
                Tone::Problem
            )
        );
    }

    output
}
