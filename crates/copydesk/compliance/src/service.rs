//! Evaluation entry point used by the workflow engine and the API.

use crate::{ComplianceError, ComplianceEvaluator, Evaluation, PolicyRuleStore, Result, Retrieval};
use copydesk_storage::{ComplianceCheckStore, QueryWindow};
use copydesk_types::{ComplianceCheck, ComplianceResult, ContentId, EvaluationMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tunables for [`ComplianceService`].
#[derive(Clone, Debug)]
pub struct ComplianceSettings {
    /// Upper bound for each retrieval and reasoning call
    pub evaluator_timeout: Duration,
    pub retrieval_top_k: usize,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            evaluator_timeout: Duration::from_secs(10),
            retrieval_top_k: 4,
        }
    }
}

/// Retrieval, evaluation and audit logging behind one call.
///
/// Evaluator and retrieval failures never reach the caller: they degrade to
/// the fail-closed manual-review verdict. Only empty input is an error.
pub struct ComplianceService {
    rules: Arc<PolicyRuleStore>,
    evaluator: Arc<dyn ComplianceEvaluator>,
    retrieval: Arc<dyn Retrieval>,
    audit: Arc<dyn ComplianceCheckStore>,
    settings: ComplianceSettings,
}

impl ComplianceService {
    pub fn new(
        rules: Arc<PolicyRuleStore>,
        evaluator: Arc<dyn ComplianceEvaluator>,
        retrieval: Arc<dyn Retrieval>,
        audit: Arc<dyn ComplianceCheckStore>,
        settings: ComplianceSettings,
    ) -> Self {
        Self {
            rules,
            evaluator,
            retrieval,
            audit,
            settings,
        }
    }

    pub fn rules(&self) -> &Arc<PolicyRuleStore> {
        &self.rules
    }

    /// Evaluate `text`, record the outcome in the audit log and return it.
    pub async fn check(
        &self,
        text: &str,
        content_id: Option<&ContentId>,
        use_context: bool,
    ) -> Result<ComplianceResult> {
        if text.trim().is_empty() {
            return Err(ComplianceError::InvalidInput(
                "text must not be empty".to_string(),
            ));
        }

        let evaluation = match self.evaluate(text, use_context).await {
            Ok(evaluation) => evaluation,
            Err(ComplianceError::InvalidInput(msg)) => {
                return Err(ComplianceError::InvalidInput(msg))
            }
            Err(err) => {
                warn!(error = %err, "Compliance evaluation failed, requiring manual review");
                Evaluation {
                    result: ComplianceResult::manual_review_required(text),
                    mode: EvaluationMode::Fallback,
                }
            }
        };

        let record = ComplianceCheck::record(
            content_id.cloned(),
            text,
            &evaluation.result,
            evaluation.mode,
        );
        let check_id = record.id.clone();
        if let Err(err) = self.audit.append_check(record).await {
            warn!(check_id = %check_id, error = %err, "Failed to append compliance check to audit log");
        }

        info!(
            check_id = %check_id,
            content_id = content_id.map(|id| id.as_str()).unwrap_or("-"),
            compliant = evaluation.result.is_compliant,
            issues = evaluation.result.issues.len(),
            mode = evaluation.mode.as_str(),
            "Compliance check completed"
        );
        Ok(evaluation.result)
    }

    pub async fn list_checks(&self, window: QueryWindow) -> Result<Vec<ComplianceCheck>> {
        Ok(self.audit.list_checks(window).await?)
    }

    async fn evaluate(&self, text: &str, use_context: bool) -> Result<Evaluation> {
        let context = if use_context {
            self.retrieve_context(text).await?
        } else {
            None
        };
        self.evaluator.evaluate(text, context.as_deref()).await
    }

    async fn retrieve_context(&self, text: &str) -> Result<Option<String>> {
        let passages = tokio::time::timeout(
            self.settings.evaluator_timeout,
            self.retrieval.search(text, self.settings.retrieval_top_k),
        )
        .await
        .map_err(|_| {
            ComplianceError::EvaluatorUnavailable(format!(
                "retrieval timed out after {:?}",
                self.settings.evaluator_timeout
            ))
        })??;

        if passages.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            passages
                .into_iter()
                .map(|passage| passage.text)
                .collect::<Vec<_>>()
                .join("\n\n"),
        ))
    }
}
