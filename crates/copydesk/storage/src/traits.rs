use crate::StorageResult;
use async_trait::async_trait;
use copydesk_types::{
    ApprovalStep, Comment, ComplianceCheck, Content, ContentId, ContentStatus, PolicyRule,
    PolicyRuleDraft, PolicyRuleId, Role, StepId, StepTransition, User, UserId, Workflow,
    WorkflowId,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

/// Expected state of a content row for compare-and-set writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentGuard {
    pub version: u32,
    pub status: ContentStatus,
}

impl ContentGuard {
    pub fn of(content: &Content) -> Self {
        Self {
            version: content.version,
            status: content.status,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with `Conflict` on a duplicate email.
    async fn insert_user(&self, user: User) -> StorageResult<()>;

    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>>;

    async fn list_users(&self) -> StorageResult<Vec<User>>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new content item. The creator must exist.
    async fn insert_content(&self, content: Content) -> StorageResult<()>;

    async fn get_content(&self, id: &ContentId) -> StorageResult<Option<Content>>;

    /// List content newest-first, optionally filtered by status.
    async fn list_content(
        &self,
        status: Option<ContentStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<Content>>;

    /// Overwrite a content row if it still matches `expected`.
    async fn update_content(&self, content: Content, expected: ContentGuard)
        -> StorageResult<()>;

    /// Move content from one status to another.
    async fn transition_content_status(
        &self,
        id: &ContentId,
        expected_from: ContentStatus,
        to: ContentStatus,
    ) -> StorageResult<Content>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Start a fresh workflow for its content.
    ///
    /// In one unit: supersedes the current workflow (an active one becomes
    /// `Cancelled`, its open steps `Skipped`) and keeps it as history, inserts
    /// `workflow`, and moves the content to `PendingReview`. Fails with
    /// `Conflict` if the content no longer matches `expected`.
    async fn start_workflow(&self, workflow: Workflow, expected: ContentGuard)
        -> StorageResult<Content>;

    /// The current (non-superseded) workflow of a content item.
    async fn current_workflow(&self, content_id: &ContentId) -> StorageResult<Option<Workflow>>;

    async fn get_workflow(&self, id: &WorkflowId) -> StorageResult<Option<Workflow>>;

    /// All workflows ever started for a content item, newest first.
    async fn list_workflows(&self, content_id: &ContentId) -> StorageResult<Vec<Workflow>>;

    async fn get_step(&self, id: &StepId) -> StorageResult<Option<ApprovalStep>>;

    /// Apply a step decision atomically.
    ///
    /// Fails with `Conflict` (and changes nothing) unless the step is still
    /// `InProgress` in a current, active workflow.
    async fn apply_transition(
        &self,
        transition: &StepTransition,
    ) -> StorageResult<(Content, Workflow)>;

    /// Steps currently awaiting a decision, optionally for one role.
    async fn list_in_progress_steps(&self, role: Option<Role>) -> StorageResult<Vec<ApprovalStep>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn append_comment(&self, comment: Comment) -> StorageResult<()>;

    /// Comments for a step, oldest first.
    async fn list_comments(&self, step_id: &StepId) -> StorageResult<Vec<Comment>>;
}

#[async_trait]
pub trait PolicyRuleRepository: Send + Sync {
    /// Validate and insert a rule, assigning its insertion position.
    async fn insert_rule(&self, draft: PolicyRuleDraft) -> StorageResult<PolicyRule>;

    async fn update_rule(&self, id: &PolicyRuleId, draft: PolicyRuleDraft)
        -> StorageResult<PolicyRule>;

    async fn set_rule_active(&self, id: &PolicyRuleId, active: bool) -> StorageResult<PolicyRule>;

    async fn get_rule(&self, id: &PolicyRuleId) -> StorageResult<Option<PolicyRule>>;

    /// Rules in insertion order.
    async fn list_rules(&self, include_inactive: bool) -> StorageResult<Vec<PolicyRule>>;
}

#[async_trait]
pub trait ComplianceCheckStore: Send + Sync {
    async fn append_check(&self, check: ComplianceCheck) -> StorageResult<()>;

    /// Read checks newest-first.
    async fn list_checks(&self, window: QueryWindow) -> StorageResult<Vec<ComplianceCheck>>;
}

/// Unified storage bundle injected into the engine and the daemon.
pub trait Storage:
    UserStore
    + ContentStore
    + WorkflowStore
    + CommentStore
    + PolicyRuleRepository
    + ComplianceCheckStore
    + Send
    + Sync
{
}

impl<T> Storage for T where
    T: UserStore
        + ContentStore
        + WorkflowStore
        + CommentStore
        + PolicyRuleRepository
        + ComplianceCheckStore
        + Send
        + Sync
{
}
