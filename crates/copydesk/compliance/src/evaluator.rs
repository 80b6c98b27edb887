use crate::{AssessmentRequest, ComplianceError, PolicyRuleStore, ReasoningBackend, Result};
use async_trait::async_trait;
use copydesk_types::{ComplianceResult, EvaluationMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A verdict together with the path that produced it.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub result: ComplianceResult,
    pub mode: EvaluationMode,
}

/// `Evaluate(text, context?) -> ComplianceResult`.
#[async_trait]
pub trait ComplianceEvaluator: Send + Sync {
    async fn evaluate(&self, text: &str, context: Option<&str>) -> Result<Evaluation>;
}

/// Deterministic evaluator over the active rule set. Context is ignored.
pub struct RuleMatchingEvaluator {
    rules: Arc<PolicyRuleStore>,
}

impl RuleMatchingEvaluator {
    pub fn new(rules: Arc<PolicyRuleStore>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ComplianceEvaluator for RuleMatchingEvaluator {
    async fn evaluate(&self, text: &str, _context: Option<&str>) -> Result<Evaluation> {
        ensure_text(text)?;
        let rules = self.rules.active_rules().await?;
        Ok(Evaluation {
            result: rules.evaluate(text)?,
            mode: EvaluationMode::RuleMatching,
        })
    }
}

/// Delegates to a reasoning backend when policy context is available and
/// falls back to rule matching otherwise.
pub struct ContextAugmentedEvaluator {
    rules: Arc<PolicyRuleStore>,
    backend: Arc<dyn ReasoningBackend>,
    timeout: Duration,
}

impl ContextAugmentedEvaluator {
    pub fn new(
        rules: Arc<PolicyRuleStore>,
        backend: Arc<dyn ReasoningBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            rules,
            backend,
            timeout,
        }
    }
}

#[async_trait]
impl ComplianceEvaluator for ContextAugmentedEvaluator {
    async fn evaluate(&self, text: &str, context: Option<&str>) -> Result<Evaluation> {
        ensure_text(text)?;
        let rules = self.rules.active_rules().await?;

        let Some(context) = context.filter(|c| !c.trim().is_empty()) else {
            return Ok(Evaluation {
                result: rules.evaluate(text)?,
                mode: EvaluationMode::RuleMatching,
            });
        };

        debug!(context_chars = context.len(), "Delegating to reasoning backend");
        let request = AssessmentRequest {
            text,
            context,
            rules: &rules,
        };
        let result = tokio::time::timeout(self.timeout, self.backend.assess(request))
            .await
            .map_err(|_| {
                ComplianceError::EvaluatorUnavailable(format!(
                    "reasoning backend timed out after {:?}",
                    self.timeout
                ))
            })??;
        Ok(Evaluation {
            result,
            mode: EvaluationMode::ContextAugmented,
        })
    }
}

fn ensure_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ComplianceError::InvalidInput(
            "text must not be empty".to_string(),
        ));
    }
    Ok(())
}
