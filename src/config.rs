use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for failtriage.
///
/// Every section and field has a built-in default, so a partial file only
/// overrides what it names. Credentials are never read from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Scan window and extraction limits
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// GitHub REST API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Remote completion service settings
    #[serde(default)]
    pub analysis_service: AnalysisServiceConfig,

    /// Named pattern groups, evaluated in file order against one log line
    /// at a time
    #[serde(default = "default_error_patterns")]
    pub error_patterns: IndexMap<String, Vec<String>>,

    /// Summary report settings
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalyzerConfig {
    /// Number of completed runs to inspect
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,

    /// Upper bound on segments analysed for a single job
    #[serde(default = "default_max_errors_per_job")]
    pub max_errors_per_job: usize,

    /// Lines kept before the triggering line
    #[serde(default = "default_context_before")]
    pub context_before: usize,

    /// Lines kept after the triggering line (the trigger itself included)
    #[serde(default = "default_context_after")]
    pub context_after: usize,

    /// Length of the context prefix compared for deduplication
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,

    /// Failed runs processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,

    /// Retries on network errors and 5xx/429 responses
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First retry delay, doubled on every further attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisServiceConfig {
    /// Base URL; requests go to `<api-url>/v1/completions`
    #[serde(default = "default_analysis_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_analysis_timeout")]
    pub timeout_seconds: u64,

    /// Skip TLS certificate verification for self-signed internal endpoints
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportConfig {
    /// Where the markdown summary is written
    #[serde(default = "default_report_path")]
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            github: GitHubConfig::default(),
            analysis_service: AnalysisServiceConfig::default(),
            error_patterns: default_error_patterns(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_runs: default_max_runs(),
            max_errors_per_job: default_max_errors_per_job(),
            context_before: default_context_before(),
            context_after: default_context_after(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            timeout_seconds: default_github_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for AnalysisServiceConfig {
    fn default() -> Self {
        Self {
            api_url: default_analysis_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_analysis_timeout(),
            accept_invalid_certs: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
        }
    }
}

fn default_max_runs() -> usize {
    20
}

fn default_max_errors_per_job() -> usize {
    10
}

fn default_context_before() -> usize {
    5
}

fn default_context_after() -> usize {
    10
}

fn default_dedup_prefix_chars() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_analysis_api_url() -> String {
    "https://granite-3-3-8b-instruct-maas-apicast-production.apps.prod.rhoai.rh-aiservices-bu.com:443"
        .to_string()
}

fn default_model() -> String {
    "granite-3-3-8b-instruct".to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.1
}

fn default_analysis_timeout() -> u64 {
    60
}

fn default_report_path() -> PathBuf {
    PathBuf::from("workflow-failure-analysis-report.md")
}

fn default_error_patterns() -> IndexMap<String, Vec<String>> {
    let mut groups = IndexMap::new();
    groups.insert(
        "critical".to_string(),
        vec![
            "FATAL:".to_string(),
            "CRITICAL:".to_string(),
            "Exception:".to_string(),
            r"Traceback \(most recent call last\):".to_string(),
            "Error: Process completed with exit code [1-9]".to_string(),
        ],
    );
    groups.insert(
        "tool-specific".to_string(),
        vec![
            r"ansible-lint.*\[E\d+\]".to_string(),
            "FAILED! =>".to_string(),
            r"fatal: \[.*\]:".to_string(),
        ],
    );
    groups
}

/// Patterns used when the configuration leaves every group empty.
pub const FALLBACK_PATTERNS: &[&str] = &[
    "ERROR:.*",
    "FAILED:.*",
    "FATAL:.*",
    "Exception:.*",
    r"Traceback \(most recent call last\):.*",
    r"ansible-lint.*\[E\d+\].*",
    r"The command .* failed with exit code \d+",
    "Error: .*",
    "Failed to .*",
];

const CANDIDATES: [&str; 4] = [
    "failtriage.toml",
    "failtriage.json",
    "failtriage.yaml",
    "failtriage.yml",
];

impl Config {
    /// Load configuration, falling back to the built-in defaults.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./failtriage.toml, ./failtriage.json, ./failtriage.yaml, ./failtriage.yml
    /// 3. `<user config dir>/failtriage/config.toml`
    ///
    /// A missing or malformed file is logged and replaced by the defaults;
    /// this never fails.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = Self::discover(path) else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        match Self::load_from_path(&path) {
            Ok(config) => {
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{e:#}; using default configuration");
                Self::default()
            }
        }
    }

    fn discover(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(path.to_path_buf());
        }

        CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .or_else(|| {
                dirs::config_dir()
                    .map(|dir| dir.join("failtriage").join("config.toml"))
                    .filter(|candidate| candidate.exists())
            })
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Ordered `(group, regex source)` pairs to compile.
    pub fn pattern_sources(&self) -> Vec<(String, String)> {
        let configured: Vec<(String, String)> = self
            .error_patterns
            .iter()
            .flat_map(|(group, patterns)| {
                patterns
                    .iter()
                    .map(move |pattern| (group.clone(), pattern.clone()))
            })
            .collect();

        if !configured.is_empty() {
            return configured;
        }

        warn!("No error patterns configured, using fallback patterns");
        FALLBACK_PATTERNS
            .iter()
            .map(|pattern| ("fallback".to_string(), (*pattern).to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analyzer.max_runs, 20);
        assert_eq!(config.analyzer.max_errors_per_job, 10);
        assert_eq!(config.analyzer.context_before, 5);
        assert_eq!(config.analyzer.context_after, 10);
        assert_eq!(config.analyzer.dedup_prefix_chars, 100);
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.retry_attempts, 3);
        assert_eq!(config.analysis_service.model, "granite-3-3-8b-instruct");
        assert_eq!(config.analysis_service.max_tokens, 800);
        assert!(!config.analysis_service.accept_invalid_certs);
    }

    #[test]
    fn test_default_pattern_groups_keep_order() {
        let config = Config::default();
        let groups: Vec<&str> = config.error_patterns.keys().map(String::as_str).collect();
        assert_eq!(groups, vec!["critical", "tool-specific"]);

        let sources = config.pattern_sources();
        assert_eq!(sources[0], ("critical".to_string(), "FATAL:".to_string()));
        assert_eq!(sources.len(), 8);
    }

    #[test]
    fn test_builtin_patterns_fit_on_one_line() {
        let defaults = Config::default().pattern_sources();
        let fallback = FALLBACK_PATTERNS.iter().map(|p| (*p).to_string());

        for pattern in defaults.into_iter().map(|(_, p)| p).chain(fallback) {
            assert!(!pattern.contains("\\n"), "{pattern} spans lines");
        }
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[analyzer]
max-runs = 50
max-errors-per-job = 3

[github]
api-url = "https://github.example.com/api/v3"
retry-attempts = 5

[analysis-service]
model = "local-model"
temperature = 0.3

[error-patterns]
custom = ["panicked at", "segfault"]
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load(Some(temp_file.path()));
        assert_eq!(config.analyzer.max_runs, 50);
        assert_eq!(config.analyzer.max_errors_per_job, 3);
        assert_eq!(config.analyzer.context_before, 5);
        assert_eq!(config.github.api_url, "https://github.example.com/api/v3");
        assert_eq!(config.github.retry_attempts, 5);
        assert_eq!(config.github.timeout_seconds, 30);
        assert_eq!(config.analysis_service.model, "local-model");
        assert_eq!(config.analysis_service.max_tokens, 800);
        assert_eq!(
            config.pattern_sources(),
            vec![
                ("custom".to_string(), "panicked at".to_string()),
                ("custom".to_string(), "segfault".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "analyzer": { "max-runs": 7 },
  "report": { "path": "out/report.md" }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load(Some(temp_file.path()));
        assert_eq!(config.analyzer.max_runs, 7);
        assert_eq!(config.report.path, PathBuf::from("out/report.md"));
        assert_eq!(config.error_patterns.len(), 2);
    }

    #[test]
    fn test_load_nonexistent_config_falls_back() {
        let config = Config::load(Some(Path::new("nonexistent.toml")));
        assert_eq!(config.analyzer.max_runs, 20);
        assert_eq!(config.github.api_url, "https://api.github.com");
    }

    #[test]
    fn test_load_malformed_config_falls_back() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{{ \"analyzer\": ").unwrap();

        let config = Config::load(Some(temp_file.path()));
        assert_eq!(config.analyzer.max_runs, 20);
        assert_eq!(config.error_patterns.len(), 2);
    }

    #[test]
    fn test_empty_pattern_groups_use_fallback() {
        let mut config = Config::default();
        config.error_patterns = IndexMap::from([("critical".to_string(), Vec::new())]);

        let sources = config.pattern_sources();
        assert_eq!(sources.len(), FALLBACK_PATTERNS.len());
        assert!(sources.iter().all(|(group, _)| group == "fallback"));
    }
}
