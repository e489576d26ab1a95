use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use super::theme::{heading, paint, Tone};

const PHASES: usize = 2;

/// Spinner for the two pipeline phases: fetching runs, then analysing
/// failed runs.
pub struct PhaseProgress {
    pb: ProgressBar,
    phase: usize,
}

impl PhaseProgress {
    pub fn start_phase_1(limit: usize) -> Self {
        eprintln!("{}  {}", heading("⚙️"), heading("Phases"));
        Self::begin(1, &format!("Fetching workflow runs (limit: {limit})"))
    }

    /// Finish phase 1 when there is nothing left to analyse.
    pub fn finish_phase_1(self, checked: usize, failed: usize) {
        self.complete(&format!("Checked {checked} runs, {failed} failed"));
        eprintln!();
    }

    pub fn finish_phase_1_start_phase_2(self, checked: usize, failed: usize) -> Self {
        self.complete(&format!("Checked {checked} runs, {failed} failed"));
        Self::begin(2, &format!("Analyzing {failed} failed workflows"))
    }

    pub fn finish_phase_2(self, analyzed: usize, created: usize) {
        self.complete(&format!(
            "Analyzed {analyzed} errors, created {created} issues"
        ));
        eprintln!();
    }

    pub fn abort(self, reason: &str) {
        let message = format!("Phase {}/{PHASES}: {reason} ✗", self.phase);
        self.pb
            .abandon_with_message(paint(message, Tone::Problem).to_string());
        eprintln!();
    }

    fn begin(phase: usize, action: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
            pb.set_style(style);
        }
        pb.set_message(paint(format!("Phase {phase}/{PHASES}: {action}"), Tone::Active).to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb, phase }
    }

    fn complete(&self, outcome: &str) {
        let message = format!("Phase {}/{PHASES}: {outcome} ✓", self.phase);
        self.pb
            .finish_with_message(paint(message, Tone::Good).to_string());
    }
}
