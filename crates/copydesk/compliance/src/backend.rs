//! Reasoning backends for context-augmented evaluation.

use crate::{ComplianceError, Result, RuleSet};
use async_trait::async_trait;
use copydesk_types::{ComplianceResult, Issue, Severity};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You review marketing copy for policy compliance. \
Answer with a single JSON object: {\"issues\": [{\"matched_text\", \"reason\", \"suggestion\", \
\"severity\": \"low\"|\"medium\"|\"high\", \"category\"}], \"suggested_rewrite\"}. \
Quote matched_text exactly as it appears in the copy. Return an empty issues list when the copy is compliant.";

/// Input handed to a reasoning backend.
pub struct AssessmentRequest<'a> {
    pub text: &'a str,
    /// Policy passages retrieved for this text
    pub context: &'a str,
    pub rules: &'a RuleSet,
}

/// A generative evaluator. Implementations return the unified result shape;
/// provider-specific field names are normalised inside the adapter.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn assess(&self, request: AssessmentRequest<'_>) -> Result<ComplianceResult>;
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct BackendVerdict {
    #[serde(alias = "violations")]
    issues: Vec<BackendIssue>,
    #[serde(default, alias = "isCompliant", alias = "compliant")]
    is_compliant: Option<bool>,
    #[serde(default, alias = "rewrite", alias = "suggested_text")]
    suggested_rewrite: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackendIssue {
    #[serde(alias = "text", alias = "phrase")]
    matched_text: String,
    #[serde(default)]
    reason: String,
    #[serde(default, alias = "replacement")]
    suggestion: String,
    #[serde(default = "default_severity")]
    severity: String,
    #[serde(default = "default_category")]
    category: String,
}

fn default_severity() -> String {
    "medium".to_string()
}

fn default_category() -> String {
    "general".to_string()
}

/// OpenAI-compatible chat completions backend.
pub struct HttpReasoningBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReasoningBackend {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                ComplianceError::EvaluatorUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            endpoint: resolve_chat_endpoint(endpoint),
            model: model.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReasoningBackend for HttpReasoningBackend {
    async fn assess(&self, request: AssessmentRequest<'_>) -> Result<ComplianceResult> {
        let payload = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": compose_prompt(&request)},
            ],
        });

        let mut builder = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ComplianceError::EvaluatorUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ComplianceError::EvaluatorUnavailable(format!(
                "backend error {}: {}",
                status,
                truncate(&body, 320)
            )));
        }

        let body: OpenAiResponse = response.json().await.map_err(|e| {
            ComplianceError::EvaluatorUnavailable(format!("invalid backend response: {e}"))
        })?;
        let choice = body.choices.first().ok_or_else(|| {
            ComplianceError::EvaluatorUnavailable("response did not include choices".to_string())
        })?;
        parse_verdict(&extract_text(&choice.message.content), request.text)
    }
}

fn compose_prompt(request: &AssessmentRequest<'_>) -> String {
    let rules = request
        .rules
        .rules()
        .map(|rule| {
            format!(
                "- \"{}\" ({}, {}): {} Suggest: \"{}\"",
                rule.pattern, rule.severity, rule.category, rule.reason, rule.suggestion
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Policy rules:\n{}\n\nRelevant policy excerpts:\n{}\n\nCopy to review:\n{}",
        if rules.is_empty() { "(none)" } else { rules.as_str() },
        request.context.trim(),
        request.text.trim()
    )
}

/// Normalise a backend answer into the unified result shape.
fn parse_verdict(raw: &str, text: &str) -> Result<ComplianceResult> {
    let verdict: BackendVerdict = serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        ComplianceError::EvaluatorUnavailable(format!("unparseable verdict: {e}"))
    })?;

    if verdict.is_compliant == Some(false) && verdict.issues.is_empty() {
        return Err(ComplianceError::EvaluatorUnavailable(
            "backend declared the copy non-compliant without listing issues".to_string(),
        ));
    }

    let mut issues = verdict
        .issues
        .into_iter()
        .map(|issue| {
            Ok(Issue {
                severity: parse_severity(&issue.severity)?,
                matched_text: issue.matched_text,
                reason: issue.reason,
                suggestion: issue.suggestion,
                category: issue.category,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));

    let rewrite = verdict
        .suggested_rewrite
        .filter(|rewrite| !rewrite.trim().is_empty())
        .unwrap_or_else(|| text.to_string());
    Ok(ComplianceResult::from_issues(issues, rewrite))
}

fn parse_severity(raw: &str) -> Result<Severity> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "high" | "critical" | "severe" => Ok(Severity::High),
        "medium" | "moderate" => Ok(Severity::Medium),
        "low" | "minor" | "info" => Ok(Severity::Low),
        other => Err(ComplianceError::EvaluatorUnavailable(format!(
            "backend returned unknown severity '{other}'"
        ))),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches("json");
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn resolve_chat_endpoint(endpoint: &str) -> String {
    if endpoint.contains("/chat/completions") {
        endpoint.to_string()
    } else {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    }
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
