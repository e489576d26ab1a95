use log::{error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::auth::Token;
use crate::config::AnalysisServiceConfig;
use crate::error::{FailTriageError, Result};
use crate::extract::ErrorSegment;

/// Engine that produced an analysis text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisBackend {
    /// Remote completion model, by model name
    Model(String),
    /// Local substitute used when the remote call failed
    Fallback,
}

impl fmt::Display for AnalysisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(name) => f.write_str(name),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Root-cause explanation for one error segment.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub text: String,
    pub backend: AnalysisBackend,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
    /// Why the remote call failed, for fallback analyses
    pub failure: Option<String>,
}

impl Analysis {
    fn fallback(segment: &ErrorSegment, reason: String) -> Self {
        Self {
            text: format!(
                "Automated analysis failed. Manual review required for error: {}",
                segment.error_line
            ),
            backend: AnalysisBackend::Fallback,
            prompt_tokens: None,
            completion_tokens: None,
            failure: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.backend == AnalysisBackend::Fallback
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: Option<usize>,
    completion_tokens: Option<usize>,
}

/// Asks a remote text-completion service to explain error segments.
///
/// Each segment gets exactly one request. Any failure (transport, HTTP
/// status, unparsable or empty completion) yields a fallback [`Analysis`]
/// instead of an error, so the segment still reaches a tracking issue.
pub struct RootCauseAnalyzer {
    client: Client,
    endpoint: Url,
    api_key: Token,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl RootCauseAnalyzer {
    /// # Errors
    ///
    /// Returns an error if the service URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &AnalysisServiceConfig, api_key: Token) -> Result<Self> {
        let base = Url::parse(&format!("{}/", config.api_url.trim_end_matches('/')))
            .map_err(|e| FailTriageError::Config(format!("Invalid analysis service URL: {e}")))?;
        let endpoint = base
            .join("v1/completions")
            .map_err(|e| FailTriageError::Config(format!("Invalid completions URL: {e}")))?;

        let client = Client::builder()
            .user_agent(concat!("failtriage/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| FailTriageError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Explain `segment`; never fails.
    pub async fn analyze(&self, segment: &ErrorSegment, run_name: &str, job_name: &str) -> Analysis {
        let prompt = build_prompt(segment, run_name, job_name);

        match self.complete(&prompt).await {
            Ok((text, usage)) => {
                info!(
                    "Analysis completed for error at line {}",
                    segment.line_number
                );
                let prompt_tokens = usage
                    .as_ref()
                    .and_then(|u| u.prompt_tokens)
                    .unwrap_or_else(|| word_count(&prompt));
                let completion_tokens = usage
                    .as_ref()
                    .and_then(|u| u.completion_tokens)
                    .unwrap_or_else(|| word_count(&text));

                Analysis {
                    text,
                    backend: AnalysisBackend::Model(self.model.clone()),
                    prompt_tokens: Some(prompt_tokens),
                    completion_tokens: Some(completion_tokens),
                    failure: None,
                }
            }
            Err(e) => {
                error!(
                    "Analysis failed for error at line {} in job {job_name}: {e}",
                    segment.line_number
                );
                Analysis::fallback(segment, e.to_string())
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<(String, Option<CompletionUsage>)> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
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

        let completion: CompletionResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(FailTriageError::EmptyCompletion);
        }

        Ok((text, completion.usage))
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Prompt asking for root cause, impact, solution and prevention.
pub fn build_prompt(segment: &ErrorSegment, run_name: &str, job_name: &str) -> String {
    format!(
        r"
You are an expert DevOps engineer analyzing a GitHub Actions workflow failure.

WORKFLOW: {run_name}
JOB: {job_name}
ERROR CONTEXT:
{context}

Please provide a structured analysis:

1. ROOT CAUSE: Identify the specific technical reason for this failure
2. IMPACT: Describe what this error prevents or breaks
3. SOLUTION: Provide step-by-step fix instructions
4. PREVENTION: Suggest how to prevent this error in the future

Format your response as a clear, actionable analysis for a developer to resolve this issue.
",
        context = segment.context
    )
}
