use log::{debug, warn};
use regex::{Regex, RegexBuilder};

/// One configured error pattern and the group it was declared in.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub group: String,
    regex: Regex,
}

impl ErrorPattern {
    /// Compiles a pattern case-insensitively, with `^`/`$` anchoring at line
    /// boundaries. Extraction matches one log line at a time, so a pattern
    /// that needs text from the following line never matches.
    pub fn new(group: impl Into<String>, source: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .multi_line(true)
            .build()?;

        Ok(Self {
            group: group.into(),
            regex,
        })
    }

    /// The regex source, used as the pattern identifier on segments.
    pub fn id(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Ordered list of patterns; earlier entries win.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<ErrorPattern>,
}

impl PatternSet {
    /// Compiles `(group, source)` pairs in order. Invalid regexes are logged
    /// and left out rather than failing the whole set.
    pub fn compile(sources: &[(String, String)]) -> Self {
        let patterns: Vec<ErrorPattern> = sources
            .iter()
            .filter_map(|(group, source)| match ErrorPattern::new(group.as_str(), source) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Skipping invalid pattern {source:?} in group {group}: {e}");
                    None
                }
            })
            .collect();

        debug!("Compiled {} error patterns", patterns.len());

        Self { patterns }
    }

    /// First pattern, in configuration order, that matches `line`.
    pub fn first_match(&self, line: &str) -> Option<&ErrorPattern> {
        self.patterns.iter().find(|pattern| pattern.is_match(line))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
