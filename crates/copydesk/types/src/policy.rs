//! Policy rules and compliance verdicts
//!
//! A [`PolicyRule`] flags a disallowed phrase. Evaluating text against the
//! active rule set (or a reasoning backend) produces a [`ComplianceResult`],
//! which is immutable once created and is embedded into content as a
//! snapshot.

use crate::{ComplianceCheckId, ContentId, PolicyRuleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Severity ─────────────────────────────────────────────────────────

/// Severity of a policy violation.
///
/// Ordered `Low < Medium < High`; only `High` blocks submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn blocks_submission(&self) -> bool {
        matches!(self, Severity::High)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(RuleValidationError::UnknownSeverity(other.to_string())),
        }
    }
}

// ── Policy Rule ──────────────────────────────────────────────────────

/// Validation failures for rule definitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("suggestion must not contain the pattern '{0}'")]
    SuggestionContainsPattern(String),

    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),
}

/// A pattern rule used to flag disallowed phrasing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: PolicyRuleId,
    /// Phrase matched case-insensitively as a plain substring
    pub pattern: String,
    /// Why the phrase is disallowed
    pub reason: String,
    /// Replacement used when generating a rewrite
    pub suggestion: String,
    pub category: String,
    pub severity: Severity,
    pub active: bool,
    /// Insertion order, used to break severity ties
    pub position: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRule {
    /// Materialize a validated draft. `position` is assigned by the store.
    pub fn from_draft(draft: PolicyRuleDraft, position: u64) -> Result<Self, RuleValidationError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: PolicyRuleId::generate(),
            pattern: draft.pattern.trim().to_string(),
            reason: draft.reason,
            suggestion: draft.suggestion,
            category: draft.category,
            severity: draft.severity,
            active: true,
            position,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a draft over this rule, keeping identity and insertion order.
    pub fn apply(&mut self, draft: PolicyRuleDraft) -> Result<(), RuleValidationError> {
        draft.validate()?;
        self.pattern = draft.pattern.trim().to_string();
        self.reason = draft.reason;
        self.suggestion = draft.suggestion;
        self.category = draft.category;
        self.severity = draft.severity;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Input for creating or updating a rule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyRuleDraft {
    pub pattern: String,
    pub reason: String,
    pub suggestion: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub severity: Severity,
}

fn default_category() -> String {
    "general".to_string()
}

impl PolicyRuleDraft {
    pub fn new(
        pattern: impl Into<String>,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
            category: category.into(),
            severity,
        }
    }

    /// A rewrite that still contains the pattern would re-trigger the rule,
    /// so such suggestions are refused up front.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        let pattern = self.pattern.trim();
        if pattern.is_empty() {
            return Err(RuleValidationError::Empty("pattern"));
        }
        if self.reason.trim().is_empty() {
            return Err(RuleValidationError::Empty("reason"));
        }
        if self
            .suggestion
            .to_lowercase()
            .contains(&pattern.to_lowercase())
        {
            return Err(RuleValidationError::SuggestionContainsPattern(
                pattern.to_string(),
            ));
        }
        Ok(())
    }
}

// ── Compliance Result ────────────────────────────────────────────────

/// A single policy violation found in evaluated text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// The offending text as it appears in the input
    pub matched_text: String,
    pub reason: String,
    pub suggestion: String,
    pub severity: Severity,
    pub category: String,
}

/// The verdict of one evaluation call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub is_compliant: bool,
    /// Ordered highest severity first
    pub issues: Vec<Issue>,
    pub suggested_rewrite: String,
    pub checked_at: DateTime<Utc>,
}

impl ComplianceResult {
    /// A clean verdict: no issues, rewrite identical to the input.
    pub fn compliant(text: impl Into<String>) -> Self {
        Self {
            is_compliant: true,
            issues: Vec::new(),
            suggested_rewrite: text.into(),
            checked_at: Utc::now(),
        }
    }

    pub fn from_issues(issues: Vec<Issue>, suggested_rewrite: impl Into<String>) -> Self {
        Self {
            is_compliant: issues.is_empty(),
            issues,
            suggested_rewrite: suggested_rewrite.into(),
            checked_at: Utc::now(),
        }
    }

    /// Fail-closed verdict used when automated evaluation could not complete.
    pub fn manual_review_required(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            is_compliant: false,
            issues: vec![Issue {
                matched_text: String::new(),
                reason: "Automated compliance check could not be completed; manual review required"
                    .to_string(),
                suggestion: "Re-run the compliance check or request a manual policy review"
                    .to_string(),
                severity: Severity::High,
                category: "system".to_string(),
            }],
            suggested_rewrite: text,
            checked_at: Utc::now(),
        }
    }

    pub fn high_severity_issues(&self) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity.blocks_submission())
            .cloned()
            .collect()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|issue| issue.severity).max()
    }

    /// Equality ignoring `checked_at`.
    pub fn same_verdict(&self, other: &ComplianceResult) -> bool {
        self.is_compliant == other.is_compliant
            && self.issues == other.issues
            && self.suggested_rewrite == other.suggested_rewrite
    }
}

/// How a verdict was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    RuleMatching,
    ContextAugmented,
    /// Conservative verdict after a backend or retrieval failure
    Fallback,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMode::RuleMatching => "rule_matching",
            EvaluationMode::ContextAugmented => "context_augmented",
            EvaluationMode::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for EvaluationMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "rule_matching" => Ok(EvaluationMode::RuleMatching),
            "context_augmented" => Ok(EvaluationMode::ContextAugmented),
            "fallback" => Ok(EvaluationMode::Fallback),
            other => Err(format!("unknown evaluation mode '{other}'")),
        }
    }
}

/// Append-only audit record of one evaluation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub id: ComplianceCheckId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    pub text: String,
    pub is_compliant: bool,
    pub issue_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_severity: Option<Severity>,
    pub mode: EvaluationMode,
    pub checked_at: DateTime<Utc>,
}

impl ComplianceCheck {
    pub fn record(
        content_id: Option<ContentId>,
        text: &str,
        result: &ComplianceResult,
        mode: EvaluationMode,
    ) -> Self {
        Self {
            id: ComplianceCheckId::generate(),
            content_id,
            text: text.to_string(),
            is_compliant: result.is_compliant,
            issue_count: result.issues.len(),
            highest_severity: result.highest_severity(),
            mode,
            checked_at: result.checked_at,
        }
    }
}
