//! The workflow engine: content lifecycle, submission and step decisions.

use crate::locks::ContentLocks;
use crate::{EngineConfig, EngineError, EngineResult, RoleAuthorizer};
use chrono::Utc;
use copydesk_compliance::{ComplianceGate, ComplianceService, GateDecision};
use copydesk_storage::{ContentGuard, QueryWindow, Storage, StorageError};
use copydesk_types::{
    ApprovalStep, Comment, ComplianceResult, Content, ContentId, ContentStatus, Role, StepId,
    StepStatus, StepTransition, User, UserId, Workflow, WorkflowEvent, WorkflowStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Input for [`WorkflowEngine::create_content`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: UserId,
}

/// Partial update for [`WorkflowEngine::edit_content`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentEdit {
    pub title: Option<String>,
    pub text: Option<String>,
    pub description: Option<String>,
}

/// The committed state after a step decision.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub content: Content,
    pub workflow: Workflow,
}

/// An in-progress step waiting for someone with its required role.
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub step: ApprovalStep,
    pub content_id: ContentId,
    pub content_title: String,
    pub content_status: ContentStatus,
}

/// Coordinates compliance, storage and role checks for the approval chain.
pub struct WorkflowEngine {
    storage: Arc<dyn Storage>,
    compliance: Arc<ComplianceService>,
    config: EngineConfig,
    locks: ContentLocks,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        compliance: Arc<ComplianceService>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            storage,
            compliance,
            config,
            locks: ContentLocks::default(),
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compliance(&self) -> &Arc<ComplianceService> {
        &self.compliance
    }

    /// Subscribe to committed transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    // ── Users ────────────────────────────────────────────────────────

    pub async fn create_user(&self, name: &str, email: &str, role: Role) -> EngineResult<User> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidInput("name must not be empty".to_string()));
        }
        let email = email.trim();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(EngineError::InvalidInput(format!(
                "'{email}' is not a valid email address"
            )));
        }
        let user = User::new(name.trim(), email, role);
        self.storage.insert_user(user.clone()).await?;
        info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, id: &UserId) -> EngineResult<User> {
        self.storage
            .get_user(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user {id} not found")))
    }

    pub async fn list_users(&self) -> EngineResult<Vec<User>> {
        Ok(self.storage.list_users().await?)
    }

    // ── Content ──────────────────────────────────────────────────────

    /// Create a DRAFT content item and attach its first compliance verdict.
    pub async fn create_content(&self, input: NewContent) -> EngineResult<Content> {
        if input.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("title must not be empty".to_string()));
        }
        if input.text.trim().is_empty() {
            return Err(EngineError::InvalidInput("text must not be empty".to_string()));
        }
        let creator = self.get_user(&input.creator_id).await?;

        let content = Content::new(
            input.title.trim(),
            input.text,
            input.description,
            creator.id.clone(),
        );
        let _guard = self.locks.acquire(&content.id).await;
        self.storage.insert_content(content.clone()).await?;

        let result = self.evaluate(&content).await?;
        let mut evaluated = content.clone();
        evaluated.attach_compliance(result);
        self.storage
            .update_content(evaluated.clone(), ContentGuard::of(&content))
            .await?;

        info!(
            content_id = %evaluated.id,
            creator_id = %creator.id,
            compliant = evaluated.current_compliance().map(|r| r.is_compliant),
            "Content created"
        );
        self.publish_event(WorkflowEvent::ContentCreated {
            content_id: evaluated.id.clone(),
            creator_id: creator.id,
            at: evaluated.created_at,
        });
        Ok(evaluated)
    }

    pub async fn get_content(&self, id: &ContentId) -> EngineResult<Content> {
        self.storage
            .get_content(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("content {id} not found")))
    }

    pub async fn list_content(
        &self,
        status: Option<ContentStatus>,
        window: QueryWindow,
    ) -> EngineResult<Vec<Content>> {
        Ok(self.storage.list_content(status, window).await?)
    }

    /// Edit a DRAFT or CHANGES_REQUESTED item.
    ///
    /// A genuine text change bumps the version and re-runs evaluation; an
    /// unchanged text keeps the existing verdict.
    pub async fn edit_content(
        &self,
        id: &ContentId,
        edit: ContentEdit,
        acting_user_id: Option<&UserId>,
    ) -> EngineResult<Content> {
        let _guard = self.locks.acquire(id).await;
        let current = self.get_content(id).await?;
        if !current.status.is_editable() {
            return Err(EngineError::StateConflict(format!(
                "content in {} cannot be edited",
                current.status
            )));
        }
        if let Some(actor_id) = acting_user_id {
            let actor = self.get_user(actor_id).await?;
            if actor.id != current.creator_id {
                return Err(EngineError::NotOwner);
            }
        }

        let mut updated = current.clone();
        let mut touched = false;
        if let Some(title) = edit.title {
            if title.trim().is_empty() {
                return Err(EngineError::InvalidInput("title must not be empty".to_string()));
            }
            touched |= updated.title != title.trim();
            updated.title = title.trim().to_string();
        }
        if let Some(description) = edit.description {
            touched |= updated.description != description;
            updated.description = description;
        }
        let mut text_changed = false;
        if let Some(text) = edit.text {
            if text.trim().is_empty() {
                return Err(EngineError::InvalidInput("text must not be empty".to_string()));
            }
            text_changed = updated.replace_text(text);
        }
        if !touched && !text_changed {
            debug!(content_id = %id, "Edit changed nothing");
            return Ok(current);
        }

        if text_changed {
            let result = self.evaluate(&updated).await?;
            updated.attach_compliance(result);
        } else {
            updated.updated_at = Utc::now();
        }
        self.storage
            .update_content(updated.clone(), ContentGuard::of(&current))
            .await?;

        info!(
            content_id = %id,
            version = updated.version,
            reevaluated = text_changed,
            "Content edited"
        );
        self.publish_event(WorkflowEvent::ContentEdited {
            content_id: id.clone(),
            version: updated.version,
            at: updated.updated_at,
        });
        Ok(updated)
    }

    /// Re-run evaluation on the current text, e.g. after an evaluator outage.
    pub async fn recheck_compliance(&self, id: &ContentId) -> EngineResult<Content> {
        let _guard = self.locks.acquire(id).await;
        let current = self.get_content(id).await?;
        if !current.status.is_editable() {
            return Err(EngineError::StateConflict(format!(
                "content in {} cannot be re-evaluated",
                current.status
            )));
        }
        let result = self.evaluate(&current).await?;
        let mut updated = current.clone();
        updated.attach_compliance(result);
        self.storage
            .update_content(updated.clone(), ContentGuard::of(&current))
            .await?;
        info!(content_id = %id, version = updated.version, "Compliance re-evaluated");
        Ok(updated)
    }

    /// The verdict for `text` without touching any content item.
    pub async fn check_text(&self, text: &str, use_context: bool) -> EngineResult<ComplianceResult> {
        Ok(self.compliance.check(text, None, use_context).await?)
    }

    // ── Workflow ─────────────────────────────────────────────────────

    /// Start a fresh approval workflow for `id`.
    ///
    /// Any current workflow is superseded and kept as history. Fails with
    /// [`EngineError::Blocked`] when the stored verdict has a high-severity
    /// issue, in which case nothing changes.
    pub async fn submit(&self, id: &ContentId) -> EngineResult<StepOutcome> {
        let _guard = self.locks.acquire(id).await;
        let content = self.get_content(id).await?;
        if !content.status.accepts_submission() {
            return Err(EngineError::StateConflict(format!(
                "content in {} cannot be submitted",
                content.status
            )));
        }
        let verdict = content.current_compliance().ok_or_else(|| {
            EngineError::StateConflict(format!(
                "no compliance verdict for version {} of content {}; re-run the compliance check",
                content.version, id
            ))
        })?;
        if let GateDecision::Blocked(issues) = ComplianceGate::can_submit(verdict) {
            info!(content_id = %id, blocking = issues.len(), "Submission blocked");
            return Err(EngineError::Blocked { issues });
        }

        let workflow = Workflow::from_template(id.clone(), &self.config.step_template)
            .ok_or_else(|| {
                EngineError::InvalidInput("step template must not be empty".to_string())
            })?;
        let content = self
            .storage
            .start_workflow(workflow.clone(), ContentGuard::of(&content))
            .await?;

        info!(
            content_id = %id,
            workflow_id = %workflow.id,
            steps = workflow.steps.len(),
            "Content submitted for approval"
        );
        self.publish_event(WorkflowEvent::Submitted {
            content_id: id.clone(),
            workflow_id: workflow.id.clone(),
            at: workflow.created_at,
        });
        Ok(StepOutcome { content, workflow })
    }

    /// Approve the in-progress step `step_id`.
    pub async fn approve(
        &self,
        step_id: &StepId,
        acting_user_id: Option<&UserId>,
    ) -> EngineResult<StepOutcome> {
        let located = self.locate_step(step_id).await?;
        let _guard = self.locks.acquire(&located.content_id).await;
        let (workflow, step) = self.decidable_step(step_id).await?;
        let actor = self.authorize_actor(acting_user_id, step.required_role).await?;

        let next = workflow.step_by_number(step.step_number + 1);
        let (activate_step, current_step_number, workflow_status, content_status) = match next {
            Some(next) => (
                Some(next.id.clone()),
                next.step_number,
                WorkflowStatus::Active,
                ContentStatus::InReview,
            ),
            None => (
                None,
                step.step_number,
                WorkflowStatus::Completed,
                ContentStatus::Approved,
            ),
        };
        let transition = StepTransition {
            workflow_id: workflow.id.clone(),
            content_id: workflow.content_id.clone(),
            step_id: step.id.clone(),
            decision: StepStatus::Approved,
            assignee_id: actor.map(|user| user.id),
            feedback: None,
            decided_at: Utc::now(),
            activate_step,
            current_step_number,
            workflow_status,
            content_status,
        };
        let (content, workflow) = self.storage.apply_transition(&transition).await?;

        info!(
            content_id = %content.id,
            workflow_id = %workflow.id,
            step = step.step_number,
            content_status = %content.status,
            "Step approved"
        );
        self.publish_event(WorkflowEvent::StepApproved {
            content_id: content.id.clone(),
            workflow_id: workflow.id.clone(),
            step_id: step.id.clone(),
            step_number: step.step_number,
            content_status: content.status,
            at: transition.decided_at,
        });
        Ok(StepOutcome { content, workflow })
    }

    /// Reject the in-progress step `step_id`, cancelling the workflow and
    /// sending the content back for changes.
    pub async fn reject(
        &self,
        step_id: &StepId,
        acting_user_id: Option<&UserId>,
        feedback: &str,
    ) -> EngineResult<StepOutcome> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(EngineError::MissingFeedback);
        }
        let located = self.locate_step(step_id).await?;
        let _guard = self.locks.acquire(&located.content_id).await;
        let (workflow, step) = self.decidable_step(step_id).await?;
        let actor = self.authorize_actor(acting_user_id, step.required_role).await?;

        let transition = StepTransition {
            workflow_id: workflow.id.clone(),
            content_id: workflow.content_id.clone(),
            step_id: step.id.clone(),
            decision: StepStatus::Rejected,
            assignee_id: actor.as_ref().map(|user| user.id.clone()),
            feedback: Some(feedback.to_string()),
            decided_at: Utc::now(),
            activate_step: None,
            current_step_number: step.step_number,
            workflow_status: WorkflowStatus::Cancelled,
            content_status: ContentStatus::ChangesRequested,
        };
        let (content, workflow) = self.storage.apply_transition(&transition).await?;

        if let Some(actor) = &actor {
            let comment = Comment::new(step.id.clone(), actor.id.clone(), feedback);
            if let Err(err) = self.storage.append_comment(comment).await {
                warn!(step_id = %step.id, error = %err, "Failed to record rejection feedback as comment");
            }
        }

        info!(
            content_id = %content.id,
            workflow_id = %workflow.id,
            step = step.step_number,
            "Step rejected"
        );
        self.publish_event(WorkflowEvent::StepRejected {
            content_id: content.id.clone(),
            workflow_id: workflow.id.clone(),
            step_id: step.id.clone(),
            step_number: step.step_number,
            at: transition.decided_at,
        });
        Ok(StepOutcome { content, workflow })
    }

    /// APPROVED → PUBLISHED.
    pub async fn publish(&self, id: &ContentId) -> EngineResult<Content> {
        let _guard = self.locks.acquire(id).await;
        let content = self.get_content(id).await?;
        if content.status != ContentStatus::Approved {
            return Err(EngineError::NotApproved(content.status));
        }
        let published = self
            .storage
            .transition_content_status(id, ContentStatus::Approved, ContentStatus::Published)
            .await
            .map_err(|err| match err {
                StorageError::Conflict(_) => EngineError::NotApproved(content.status),
                other => other.into(),
            })?;

        info!(content_id = %id, "Content published");
        self.publish_event(WorkflowEvent::Published {
            content_id: id.clone(),
            at: published.updated_at,
        });
        Ok(published)
    }

    pub async fn current_workflow(&self, content_id: &ContentId) -> EngineResult<Option<Workflow>> {
        self.get_content(content_id).await?;
        Ok(self.storage.current_workflow(content_id).await?)
    }

    /// Every workflow for the content, current first.
    pub async fn workflow_history(&self, content_id: &ContentId) -> EngineResult<Vec<Workflow>> {
        self.get_content(content_id).await?;
        Ok(self.storage.list_workflows(content_id).await?)
    }

    pub async fn get_step(&self, step_id: &StepId) -> EngineResult<ApprovalStep> {
        self.storage
            .get_step(step_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("step {step_id} not found")))
    }

    /// In-progress steps, optionally only those awaiting `role`.
    pub async fn pending_approvals(&self, role: Option<Role>) -> EngineResult<Vec<PendingApproval>> {
        let steps = self.storage.list_in_progress_steps(role).await?;
        let mut pending = Vec::with_capacity(steps.len());
        for step in steps {
            let Some(workflow) = self.storage.get_workflow(&step.workflow_id).await? else {
                continue;
            };
            let Some(content) = self.storage.get_content(&workflow.content_id).await? else {
                continue;
            };
            pending.push(PendingApproval {
                step,
                content_id: content.id,
                content_title: content.title,
                content_status: content.status,
            });
        }
        Ok(pending)
    }

    // ── Comments ─────────────────────────────────────────────────────

    pub async fn add_comment(
        &self,
        step_id: &StepId,
        author_id: &UserId,
        text: &str,
    ) -> EngineResult<Comment> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "comment must not be empty".to_string(),
            ));
        }
        self.get_step(step_id).await?;
        let author = self.get_user(author_id).await?;
        let comment = Comment::new(step_id.clone(), author.id, text.trim());
        self.storage.append_comment(comment.clone()).await?;
        debug!(step_id = %step_id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    pub async fn list_comments(&self, step_id: &StepId) -> EngineResult<Vec<Comment>> {
        self.get_step(step_id).await?;
        Ok(self.storage.list_comments(step_id).await?)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn evaluate(&self, content: &Content) -> EngineResult<ComplianceResult> {
        Ok(self
            .compliance
            .check(&content.text, Some(&content.id), self.config.use_context)
            .await?)
    }

    /// Find the workflow owning `step_id`, outside the content lock.
    async fn locate_step(&self, step_id: &StepId) -> EngineResult<Workflow> {
        let step = self.get_step(step_id).await?;
        self.storage
            .get_workflow(&step.workflow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {} not found", step.workflow_id)))
    }

    /// Re-read the step under the content lock and check it can be decided.
    async fn decidable_step(&self, step_id: &StepId) -> EngineResult<(Workflow, ApprovalStep)> {
        let step = self.get_step(step_id).await?;
        let workflow = self
            .storage
            .get_workflow(&step.workflow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {} not found", step.workflow_id)))?;
        if step.status != StepStatus::InProgress {
            return Err(EngineError::StateConflict(format!(
                "step {} is {}, not IN_PROGRESS",
                step_id,
                step.status.as_str()
            )));
        }
        if !workflow.is_active() || !workflow.is_current() {
            return Err(EngineError::StateConflict(format!(
                "workflow {} is no longer active",
                workflow.id
            )));
        }
        Ok((workflow, step))
    }

    async fn authorize_actor(
        &self,
        acting_user_id: Option<&UserId>,
        required: Role,
    ) -> EngineResult<Option<User>> {
        match acting_user_id {
            Some(id) => {
                let user = self.get_user(id).await?;
                RoleAuthorizer::authorize(&user, required)?;
                Ok(Some(user))
            }
            None if self.config.enforce_identity => Err(EngineError::IdentityRequired),
            None => Ok(None),
        }
    }

    fn publish_event(&self, event: WorkflowEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
