//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. Users, content, workflows and comments
//! live behind a single lock so that multi-row transitions commit as one
//! unit. Production deployments should use the PostgreSQL adapter.

use crate::traits::{
    CommentStore, ComplianceCheckStore, ContentGuard, ContentStore, PolicyRuleRepository,
    QueryWindow, UserStore, WorkflowStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use copydesk_types::{
    ApprovalStep, Comment, ComplianceCheck, Content, ContentId, ContentStatus, PolicyRule,
    PolicyRuleDraft, PolicyRuleId, Role, StepId, StepStatus, StepTransition, User, UserId,
    Workflow, WorkflowId, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Default)]
struct ApprovalState {
    users: HashMap<UserId, User>,
    content: HashMap<ContentId, Content>,
    workflows: HashMap<WorkflowId, Workflow>,
    current: HashMap<ContentId, WorkflowId>,
    step_index: HashMap<StepId, WorkflowId>,
    comments: Vec<Comment>,
}

/// In-memory storage adapter.
#[derive(Default)]
pub struct InMemoryStorage {
    state: RwLock<ApprovalState>,
    rules: RwLock<Vec<PolicyRule>>,
    rule_sequence: AtomicU64,
    checks: RwLock<Vec<ComplianceCheck>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_state(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, ApprovalState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("approval state lock poisoned".to_string()))
    }

    fn write_state(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, ApprovalState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("approval state lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryStorage {
    async fn insert_user(&self, user: User) -> StorageResult<()> {
        let mut state = self.write_state()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>> {
        Ok(self.read_state()?.users.get(id).cloned())
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let state = self.read_state()?;
        let mut users = state.users.values().cloned().collect::<Vec<_>>();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }
}

#[async_trait]
impl ContentStore for InMemoryStorage {
    async fn insert_content(&self, content: Content) -> StorageResult<()> {
        let mut state = self.write_state()?;
        if !state.users.contains_key(&content.creator_id) {
            return Err(StorageError::InvariantViolation(format!(
                "creator {} does not exist",
                content.creator_id
            )));
        }
        if state.content.contains_key(&content.id) {
            return Err(StorageError::Conflict(format!(
                "content {} already exists",
                content.id
            )));
        }
        state.content.insert(content.id.clone(), content);
        Ok(())
    }

    async fn get_content(&self, id: &ContentId) -> StorageResult<Option<Content>> {
        Ok(self.read_state()?.content.get(id).cloned())
    }

    async fn list_content(
        &self,
        status: Option<ContentStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<Content>> {
        let state = self.read_state()?;
        let mut items = state
            .content
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(apply_window(items, window))
    }

    async fn update_content(
        &self,
        content: Content,
        expected: ContentGuard,
    ) -> StorageResult<()> {
        let mut state = self.write_state()?;
        let stored = state
            .content
            .get_mut(&content.id)
            .ok_or_else(|| StorageError::NotFound(format!("content {} not found", content.id)))?;
        if ContentGuard::of(stored) != expected {
            return Err(StorageError::Conflict(format!(
                "content {} changed concurrently: expected v{} {}, found v{} {}",
                content.id, expected.version, expected.status, stored.version, stored.status
            )));
        }
        *stored = content;
        Ok(())
    }

    async fn transition_content_status(
        &self,
        id: &ContentId,
        expected_from: ContentStatus,
        to: ContentStatus,
    ) -> StorageResult<Content> {
        let mut state = self.write_state()?;
        let stored = state
            .content
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("content {} not found", id)))?;
        if stored.status != expected_from {
            return Err(StorageError::Conflict(format!(
                "invalid status transition: expected {}, found {}",
                expected_from, stored.status
            )));
        }
        stored.status = to;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStorage {
    async fn start_workflow(
        &self,
        workflow: Workflow,
        expected: ContentGuard,
    ) -> StorageResult<Content> {
        let mut guard = self.write_state()?;
        let state = &mut *guard;

        let content = state.content.get_mut(&workflow.content_id).ok_or_else(|| {
            StorageError::NotFound(format!("content {} not found", workflow.content_id))
        })?;
        if ContentGuard::of(content) != expected {
            return Err(StorageError::Conflict(format!(
                "content {} changed before submission",
                workflow.content_id
            )));
        }
        if state.workflows.contains_key(&workflow.id) {
            return Err(StorageError::Conflict(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }

        let now = Utc::now();
        if let Some(previous_id) = state.current.get(&workflow.content_id) {
            if let Some(previous) = state.workflows.get_mut(previous_id) {
                supersede(previous, now);
            }
        }

        content.status = ContentStatus::PendingReview;
        content.updated_at = now;
        let content = content.clone();

        for step in &workflow.steps {
            state
                .step_index
                .insert(step.id.clone(), workflow.id.clone());
        }
        state
            .current
            .insert(workflow.content_id.clone(), workflow.id.clone());
        state.workflows.insert(workflow.id.clone(), workflow);
        Ok(content)
    }

    async fn current_workflow(&self, content_id: &ContentId) -> StorageResult<Option<Workflow>> {
        let state = self.read_state()?;
        Ok(state
            .current
            .get(content_id)
            .and_then(|id| state.workflows.get(id))
            .cloned())
    }

    async fn get_workflow(&self, id: &WorkflowId) -> StorageResult<Option<Workflow>> {
        Ok(self.read_state()?.workflows.get(id).cloned())
    }

    async fn list_workflows(&self, content_id: &ContentId) -> StorageResult<Vec<Workflow>> {
        let state = self.read_state()?;
        let mut items = state
            .workflows
            .values()
            .filter(|w| &w.content_id == content_id)
            .cloned()
            .collect::<Vec<_>>();
        // Superseded workflows are older than the current one.
        items.sort_by(|a, b| {
            a.superseded_at
                .is_some()
                .cmp(&b.superseded_at.is_some())
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(items)
    }

    async fn get_step(&self, id: &StepId) -> StorageResult<Option<ApprovalStep>> {
        let state = self.read_state()?;
        Ok(state
            .step_index
            .get(id)
            .and_then(|wf| state.workflows.get(wf))
            .and_then(|wf| wf.step(id))
            .cloned())
    }

    async fn apply_transition(
        &self,
        transition: &StepTransition,
    ) -> StorageResult<(Content, Workflow)> {
        let mut guard = self.write_state()?;
        let state = &mut *guard;

        let stored = state.workflows.get(&transition.workflow_id).ok_or_else(|| {
            StorageError::NotFound(format!("workflow {} not found", transition.workflow_id))
        })?;
        if stored.content_id != transition.content_id {
            return Err(StorageError::InvalidInput(format!(
                "workflow {} does not belong to content {}",
                transition.workflow_id, transition.content_id
            )));
        }

        let mut updated = stored.clone();
        updated
            .apply_transition(transition)
            .map_err(StorageError::Conflict)?;

        let content = state.content.get_mut(&transition.content_id).ok_or_else(|| {
            StorageError::NotFound(format!("content {} not found", transition.content_id))
        })?;
        content.status = transition.content_status;
        content.updated_at = transition.decided_at;
        let content = content.clone();

        state
            .workflows
            .insert(updated.id.clone(), updated.clone());
        Ok((content, updated))
    }

    async fn list_in_progress_steps(&self, role: Option<Role>) -> StorageResult<Vec<ApprovalStep>> {
        let state = self.read_state()?;
        let mut waiting = state
            .current
            .values()
            .filter_map(|id| state.workflows.get(id))
            .filter(|wf| wf.is_active())
            .filter_map(|wf| wf.in_progress_step().map(|step| (wf.created_at, step)))
            .filter(|(_, step)| role.map_or(true, |r| step.required_role == r))
            .map(|(created_at, step)| (created_at, step.clone()))
            .collect::<Vec<_>>();
        waiting.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        Ok(waiting.into_iter().map(|(_, step)| step).collect())
    }
}

fn supersede(workflow: &mut Workflow, now: chrono::DateTime<Utc>) {
    if workflow.status == WorkflowStatus::Active {
        workflow.status = WorkflowStatus::Cancelled;
        workflow.completed_at = Some(now);
        for step in &mut workflow.steps {
            if matches!(step.status, StepStatus::InProgress | StepStatus::Pending) {
                step.status = StepStatus::Skipped;
            }
        }
    }
    workflow.superseded_at = Some(now);
}

#[async_trait]
impl CommentStore for InMemoryStorage {
    async fn append_comment(&self, comment: Comment) -> StorageResult<()> {
        let mut state = self.write_state()?;
        if !state.step_index.contains_key(&comment.step_id) {
            return Err(StorageError::InvariantViolation(format!(
                "step {} does not exist",
                comment.step_id
            )));
        }
        if !state.users.contains_key(&comment.author_id) {
            return Err(StorageError::InvariantViolation(format!(
                "author {} does not exist",
                comment.author_id
            )));
        }
        state.comments.push(comment);
        Ok(())
    }

    async fn list_comments(&self, step_id: &StepId) -> StorageResult<Vec<Comment>> {
        let state = self.read_state()?;
        Ok(state
            .comments
            .iter()
            .filter(|c| &c.step_id == step_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PolicyRuleRepository for InMemoryStorage {
    async fn insert_rule(&self, draft: PolicyRuleDraft) -> StorageResult<PolicyRule> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::Backend("rules lock poisoned".to_string()))?;
        let position = self.rule_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let rule = PolicyRule::from_draft(draft, position)
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
        ensure_pattern_free(&rules, &rule)?;
        rules.push(rule.clone());
        Ok(rule)
    }

    async fn update_rule(
        &self,
        id: &PolicyRuleId,
        draft: PolicyRuleDraft,
    ) -> StorageResult<PolicyRule> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::Backend("rules lock poisoned".to_string()))?;
        let idx = rule_index(&rules, id)?;
        let mut updated = rules[idx].clone();
        updated
            .apply(draft)
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
        if updated.active {
            ensure_pattern_free(&rules, &updated)?;
        }
        rules[idx] = updated.clone();
        Ok(updated)
    }

    async fn set_rule_active(&self, id: &PolicyRuleId, active: bool) -> StorageResult<PolicyRule> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::Backend("rules lock poisoned".to_string()))?;
        let idx = rule_index(&rules, id)?;
        if active && !rules[idx].active {
            ensure_pattern_free(&rules, &rules[idx])?;
        }
        let rule = &mut rules[idx];
        rule.active = active;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn get_rule(&self, id: &PolicyRuleId) -> StorageResult<Option<PolicyRule>> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::Backend("rules lock poisoned".to_string()))?;
        Ok(rules.iter().find(|r| &r.id == id).cloned())
    }

    async fn list_rules(&self, include_inactive: bool) -> StorageResult<Vec<PolicyRule>> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::Backend("rules lock poisoned".to_string()))?;
        let mut values = rules
            .iter()
            .filter(|r| include_inactive || r.active)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by_key(|r| r.position);
        Ok(values)
    }
}

#[async_trait]
impl ComplianceCheckStore for InMemoryStorage {
    async fn append_check(&self, check: ComplianceCheck) -> StorageResult<()> {
        let mut checks = self
            .checks
            .write()
            .map_err(|_| StorageError::Backend("compliance check lock poisoned".to_string()))?;
        checks.push(check);
        Ok(())
    }

    async fn list_checks(&self, window: QueryWindow) -> StorageResult<Vec<ComplianceCheck>> {
        let checks = self
            .checks
            .read()
            .map_err(|_| StorageError::Backend("compliance check lock poisoned".to_string()))?;
        let values = checks.iter().rev().cloned().collect::<Vec<_>>();
        Ok(apply_window(values, window))
    }
}

fn rule_index(rules: &[PolicyRule], id: &PolicyRuleId) -> StorageResult<usize> {
    rules
        .iter()
        .position(|r| &r.id == id)
        .ok_or_else(|| StorageError::NotFound(format!("policy rule {} not found", id)))
}

/// Active patterns are unique regardless of case, matching the
/// `lower(pattern)` index of the PostgreSQL adapter.
fn ensure_pattern_free(rules: &[PolicyRule], candidate: &PolicyRule) -> StorageResult<()> {
    let pattern = candidate.pattern.to_lowercase();
    if rules
        .iter()
        .any(|r| r.active && r.id != candidate.id && r.pattern.to_lowercase() == pattern)
    {
        return Err(StorageError::Conflict(format!(
            "an active rule for '{}' already exists",
            candidate.pattern
        )));
    }
    Ok(())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
