use log::{debug, info};

use crate::config::AnalyzerConfig;
use crate::patterns::PatternSet;

/// A bounded excerpt of a job log around one matched error line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSegment {
    /// 1-based line number of the triggering line
    pub line_number: usize,
    /// The triggering line, trimmed
    pub error_line: String,
    /// Lines surrounding the trigger, joined with `\n`
    pub context: String,
    /// Group of the pattern that matched
    pub pattern_group: String,
    /// Source of the pattern that matched
    pub pattern: String,
}

/// Sizes of the context window and of the deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    pub before: usize,
    pub after: usize,
    pub dedup_prefix_chars: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            before: 5,
            after: 10,
            dedup_prefix_chars: 100,
        }
    }
}

impl From<&AnalyzerConfig> for ContextWindow {
    fn from(config: &AnalyzerConfig) -> Self {
        Self {
            before: config.context_before,
            after: config.context_after,
            dedup_prefix_chars: config.dedup_prefix_chars,
        }
    }
}

/// Scans raw log text for configured error patterns.
///
/// Extraction is pure and deterministic: the same log and patterns always
/// yield the same segments in line order. A log without matches yields an
/// empty list, which is a normal outcome.
#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    patterns: PatternSet,
    window: ContextWindow,
}

impl SegmentExtractor {
    pub fn new(patterns: PatternSet, window: ContextWindow) -> Self {
        Self { patterns, window }
    }

    pub fn extract(&self, log: &str) -> Vec<ErrorSegment> {
        let lines: Vec<&str> = log
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        let mut segments: Vec<ErrorSegment> = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            let Some(pattern) = self.patterns.first_match(line) else {
                continue;
            };

            // Window is [index - before, index + after), clamped to the log.
            let start = index.saturating_sub(self.window.before);
            let end = index
                .saturating_add(self.window.after)
                .min(lines.len())
                .max(start);
            let context = lines[start..end].join("\n");

            if self.is_duplicate(&context, &segments) {
                debug!("Skipping duplicate error context at line {}", index + 1);
                continue;
            }

            segments.push(ErrorSegment {
                line_number: index + 1,
                error_line: line.trim().to_string(),
                context,
                pattern_group: pattern.group.clone(),
                pattern: pattern.id().to_string(),
            });
        }

        info!("Extracted {} distinct error segments", segments.len());
        segments
    }

    fn is_duplicate(&self, context: &str, accepted: &[ErrorSegment]) -> bool {
        let key = char_prefix(context, self.window.dedup_prefix_chars);
        accepted
            .iter()
            .any(|segment| char_prefix(&segment.context, self.window.dedup_prefix_chars).contains(key))
    }
}

/// First `n` characters of `text`, never splitting a UTF-8 sequence.
fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
