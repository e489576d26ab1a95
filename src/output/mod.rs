mod progress;
mod report;
mod summary;
mod theme;

pub use progress::PhaseProgress;
pub use report::{render_report, write_report};
pub use summary::print_summary;

use theme::{brand, muted};

/// Prints the tool name and version to stderr.
pub fn print_banner() {
    eprintln!(
        "\n{} {}\n  {}\n",
        brand("🚨 failtriage"),
        muted(env!("CARGO_PKG_VERSION")),
        muted("Workflow Failure Analyzer")
    );
}
