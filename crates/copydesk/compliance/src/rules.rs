//! Policy rule store with a read-through cache of the compiled active set.

use crate::{ComplianceError, Result, RuleSet};
use copydesk_storage::{PolicyRuleRepository, StorageError};
use copydesk_types::{PolicyRule, PolicyRuleDraft, PolicyRuleId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct RuleCache {
    generation: u64,
    compiled: Option<Arc<RuleSet>>,
}

/// Serves active rules to evaluators and owns every rule mutation.
///
/// Mutations invalidate the cache before they return, so an acknowledged
/// change is visible to the next evaluation.
pub struct PolicyRuleStore {
    repository: Arc<dyn PolicyRuleRepository>,
    cache: RwLock<RuleCache>,
}

impl PolicyRuleStore {
    pub fn new(repository: Arc<dyn PolicyRuleRepository>) -> Self {
        Self {
            repository,
            cache: RwLock::new(RuleCache::default()),
        }
    }

    /// The compiled active rule set.
    pub async fn active_rules(&self) -> Result<Arc<RuleSet>> {
        let generation = {
            let cache = self.cache.read().await;
            if let Some(compiled) = &cache.compiled {
                return Ok(compiled.clone());
            }
            cache.generation
        };

        let rules = self.repository.list_rules(false).await?;
        let compiled = Arc::new(RuleSet::compile(rules)?);
        debug!(rules = compiled.len(), "Loaded active policy rules");

        let mut cache = self.cache.write().await;
        // A mutation that landed while we were loading wins.
        if cache.generation == generation {
            cache.compiled = Some(compiled.clone());
        }
        Ok(compiled)
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<PolicyRule>> {
        Ok(self.repository.list_rules(include_inactive).await?)
    }

    pub async fn get(&self, id: &PolicyRuleId) -> Result<PolicyRule> {
        self.repository
            .get_rule(id)
            .await?
            .ok_or_else(|| ComplianceError::RuleNotFound(id.to_string()))
    }

    pub async fn create(&self, draft: PolicyRuleDraft) -> Result<PolicyRule> {
        let rule = self
            .repository
            .insert_rule(draft)
            .await
            .map_err(|e| map_rule_error(e, None))?;
        self.invalidate().await;
        info!(rule_id = %rule.id, pattern = %rule.pattern, severity = %rule.severity, "Policy rule created");
        Ok(rule)
    }

    pub async fn update(&self, id: &PolicyRuleId, draft: PolicyRuleDraft) -> Result<PolicyRule> {
        let rule = self
            .repository
            .update_rule(id, draft)
            .await
            .map_err(|e| map_rule_error(e, Some(id)))?;
        self.invalidate().await;
        info!(rule_id = %rule.id, "Policy rule updated");
        Ok(rule)
    }

    pub async fn deactivate(&self, id: &PolicyRuleId) -> Result<PolicyRule> {
        let rule = self
            .repository
            .set_rule_active(id, false)
            .await
            .map_err(|e| map_rule_error(e, Some(id)))?;
        self.invalidate().await;
        info!(rule_id = %rule.id, "Policy rule deactivated");
        Ok(rule)
    }

    /// Insert `drafts` if no rule exists yet. Returns how many were inserted.
    pub async fn seed_if_empty(&self, drafts: Vec<PolicyRuleDraft>) -> Result<usize> {
        if !self.repository.list_rules(true).await?.is_empty() {
            return Ok(0);
        }
        let mut inserted = 0;
        for draft in drafts {
            self.repository
                .insert_rule(draft)
                .await
                .map_err(|e| map_rule_error(e, None))?;
            inserted += 1;
        }
        self.invalidate().await;
        info!(inserted, "Seeded policy rules");
        Ok(inserted)
    }

    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.generation += 1;
        cache.compiled = None;
    }
}

fn map_rule_error(err: StorageError, id: Option<&PolicyRuleId>) -> ComplianceError {
    match (err, id) {
        (StorageError::InvalidInput(msg), _) => ComplianceError::InvalidInput(msg),
        (StorageError::NotFound(_), Some(id)) => ComplianceError::RuleNotFound(id.to_string()),
        (other, _) => ComplianceError::Storage(other),
    }
}
