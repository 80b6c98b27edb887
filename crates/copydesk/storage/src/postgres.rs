//! PostgreSQL adapter for copydesk storage.
//!
//! The transactional source of truth for production deployments. Submission
//! and step decisions run inside one transaction each, guarded by
//! status-conditioned updates, so a racing writer observes either the full
//! transition or none of it.

use crate::traits::{
    CommentStore, ComplianceCheckStore, ContentGuard, ContentStore, PolicyRuleRepository,
    QueryWindow, UserStore, WorkflowStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copydesk_types::{
    ApprovalStep, Comment, CommentId, ComplianceCheck, ComplianceCheckId, ComplianceSnapshot,
    Content, ContentId, ContentStatus, EvaluationMode, PolicyRule, PolicyRuleDraft, PolicyRuleId,
    Role, Severity, StepId, StepStatus, StepTransition, User, UserId, Workflow, WorkflowId,
    WorkflowStatus,
};
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

const CONTENT_COLUMNS: &str = "content_id, title, body, description, status, version, compliance, creator_id, created_at, updated_at";
const WORKFLOW_COLUMNS: &str =
    "workflow_id, content_id, current_step_number, status, created_at, completed_at, superseded_at";
const STEP_COLUMNS: &str = "step_id, workflow_id, step_number, step_name, required_role, assignee_id, status, feedback, decided_at";
const RULE_COLUMNS: &str = "rule_id, position, pattern, reason, suggestion, category, severity, active, created_at, updated_at";

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_users (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_content (
                content_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                version INTEGER NOT NULL,
                compliance JSONB,
                creator_id TEXT NOT NULL REFERENCES copydesk_users(user_id) ON DELETE RESTRICT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_workflows (
                workflow_id TEXT PRIMARY KEY,
                content_id TEXT NOT NULL REFERENCES copydesk_content(content_id) ON DELETE CASCADE,
                current_step_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                superseded_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS copydesk_workflows_current
                ON copydesk_workflows (content_id)
             WHERE superseded_at IS NULL
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_approval_steps (
                step_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL REFERENCES copydesk_workflows(workflow_id) ON DELETE CASCADE,
                step_number INTEGER NOT NULL,
                step_name TEXT NOT NULL,
                required_role TEXT NOT NULL,
                assignee_id TEXT REFERENCES copydesk_users(user_id) ON DELETE SET NULL,
                status TEXT NOT NULL,
                feedback TEXT,
                decided_at TIMESTAMPTZ,
                UNIQUE (workflow_id, step_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_comments (
                comment_id TEXT PRIMARY KEY,
                step_id TEXT NOT NULL REFERENCES copydesk_approval_steps(step_id) ON DELETE CASCADE,
                author_id TEXT NOT NULL REFERENCES copydesk_users(user_id) ON DELETE RESTRICT,
                body TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_policy_rules (
                rule_id TEXT PRIMARY KEY,
                position BIGSERIAL UNIQUE,
                pattern TEXT NOT NULL,
                reason TEXT NOT NULL,
                suggestion TEXT NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                active BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS copydesk_policy_rules_active_pattern
                ON copydesk_policy_rules (lower(pattern))
             WHERE active
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS copydesk_compliance_checks (
                check_id TEXT PRIMARY KEY,
                content_id TEXT REFERENCES copydesk_content(content_id) ON DELETE SET NULL,
                body TEXT NOT NULL,
                is_compliant BOOLEAN NOT NULL,
                issue_count BIGINT NOT NULL,
                highest_severity TEXT,
                mode TEXT NOT NULL,
                checked_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn content_exists(&self, id: &ContentId) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM copydesk_content WHERE content_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl UserStore for PostgresStorage {
    async fn insert_user(&self, user: User) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO copydesk_users (user_id, name, email, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, name, email, role, created_at FROM copydesk_users WHERE user_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(user_row_to_record).transpose()
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT user_id, name, email, role, created_at FROM copydesk_users ORDER BY created_at, user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(user_row_to_record).collect()
    }
}

#[async_trait]
impl ContentStore for PostgresStorage {
    async fn insert_content(&self, content: Content) -> StorageResult<()> {
        let compliance = compliance_to_json(&content.compliance)?;
        sqlx::query(
            r#"
            INSERT INTO copydesk_content
                (content_id, title, body, description, status, version, compliance, creator_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(content.id.as_str())
        .bind(&content.title)
        .bind(&content.text)
        .bind(&content.description)
        .bind(content.status.as_str())
        .bind(to_i32(content.version)?)
        .bind(compliance)
        .bind(content.creator_id.as_str())
        .bind(content.created_at)
        .bind(content.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_content(&self, id: &ContentId) -> StorageResult<Option<Content>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM copydesk_content WHERE content_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(content_row_to_record).transpose()
    }

    async fn list_content(
        &self,
        status: Option<ContentStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<Content>> {
        // LIMIT NULL means no limit in PostgreSQL.
        let limit = if window.limit == 0 {
            None
        } else {
            Some(to_i64(window.limit)?)
        };
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONTENT_COLUMNS}
              FROM copydesk_content
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY created_at DESC, content_id
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(content_row_to_record).collect()
    }

    async fn update_content(
        &self,
        content: Content,
        expected: ContentGuard,
    ) -> StorageResult<()> {
        let compliance = compliance_to_json(&content.compliance)?;
        let result = sqlx::query(
            r#"
            UPDATE copydesk_content
               SET title = $1,
                   body = $2,
                   description = $3,
                   status = $4,
                   version = $5,
                   compliance = $6,
                   updated_at = $7
             WHERE content_id = $8
               AND version = $9
               AND status = $10
            "#,
        )
        .bind(&content.title)
        .bind(&content.text)
        .bind(&content.description)
        .bind(content.status.as_str())
        .bind(to_i32(content.version)?)
        .bind(compliance)
        .bind(content.updated_at)
        .bind(content.id.as_str())
        .bind(to_i32(expected.version)?)
        .bind(expected.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            if self.content_exists(&content.id).await? {
                return Err(StorageError::Conflict(format!(
                    "content {} changed concurrently",
                    content.id
                )));
            }
            return Err(StorageError::NotFound(format!(
                "content {} not found",
                content.id
            )));
        }
        Ok(())
    }

    async fn transition_content_status(
        &self,
        id: &ContentId,
        expected_from: ContentStatus,
        to: ContentStatus,
    ) -> StorageResult<Content> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE copydesk_content
               SET status = $1,
                   updated_at = $2
             WHERE content_id = $3
               AND status = $4
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id.as_str())
        .bind(expected_from.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => content_row_to_record(row),
            None if self.content_exists(id).await? => Err(StorageError::Conflict(format!(
                "invalid status transition for content {}: expected {}",
                id, expected_from
            ))),
            None => Err(StorageError::NotFound(format!("content {} not found", id))),
        }
    }
}

#[async_trait]
impl WorkflowStore for PostgresStorage {
    async fn start_workflow(
        &self,
        workflow: Workflow,
        expected: ContentGuard,
    ) -> StorageResult<Content> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE copydesk_content
               SET status = $1,
                   updated_at = $2
             WHERE content_id = $3
               AND version = $4
               AND status = $5
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(ContentStatus::PendingReview.as_str())
        .bind(now)
        .bind(workflow.content_id.as_str())
        .bind(to_i32(expected.version)?)
        .bind(expected.status.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let content = match row {
            Some(row) => content_row_to_record(row)?,
            None => {
                drop(tx);
                if self.content_exists(&workflow.content_id).await? {
                    return Err(StorageError::Conflict(format!(
                        "content {} changed before submission",
                        workflow.content_id
                    )));
                }
                return Err(StorageError::NotFound(format!(
                    "content {} not found",
                    workflow.content_id
                )));
            }
        };

        sqlx::query(
            r#"
            UPDATE copydesk_approval_steps
               SET status = $1
             WHERE status IN ($2, $3)
               AND workflow_id IN (
                    SELECT workflow_id
                      FROM copydesk_workflows
                     WHERE content_id = $4
                       AND superseded_at IS NULL
                       AND status = $5
               )
            "#,
        )
        .bind(StepStatus::Skipped.as_str())
        .bind(StepStatus::Pending.as_str())
        .bind(StepStatus::InProgress.as_str())
        .bind(workflow.content_id.as_str())
        .bind(WorkflowStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE copydesk_workflows
               SET completed_at = CASE WHEN status = $1 THEN $2 ELSE completed_at END,
                   status = CASE WHEN status = $1 THEN $3 ELSE status END,
                   superseded_at = $2
             WHERE content_id = $4
               AND superseded_at IS NULL
            "#,
        )
        .bind(WorkflowStatus::Active.as_str())
        .bind(now)
        .bind(WorkflowStatus::Cancelled.as_str())
        .bind(workflow.content_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO copydesk_workflows
                (workflow_id, content_id, current_step_number, status, created_at, completed_at, superseded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id.as_str())
        .bind(workflow.content_id.as_str())
        .bind(to_i32(workflow.current_step_number)?)
        .bind(workflow.status.as_str())
        .bind(workflow.created_at)
        .bind(workflow.completed_at)
        .bind(workflow.superseded_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        for step in &workflow.steps {
            sqlx::query(
                r#"
                INSERT INTO copydesk_approval_steps
                    (step_id, workflow_id, step_number, step_name, required_role, assignee_id, status, feedback, decided_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(step.id.as_str())
            .bind(workflow.id.as_str())
            .bind(to_i32(step.step_number)?)
            .bind(&step.step_name)
            .bind(step.required_role.as_str())
            .bind(step.assignee_id.as_ref().map(|id| id.as_str()))
            .bind(step.status.as_str())
            .bind(step.feedback.as_deref())
            .bind(step.decided_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_conflict)?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(content)
    }

    async fn current_workflow(&self, content_id: &ContentId) -> StorageResult<Option<Workflow>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
              FROM copydesk_workflows
             WHERE content_id = $1
               AND superseded_at IS NULL
            "#
        ))
        .bind(content_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(load_workflow(&self.pool, row).await?)),
            None => Ok(None),
        }
    }

    async fn get_workflow(&self, id: &WorkflowId) -> StorageResult<Option<Workflow>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM copydesk_workflows WHERE workflow_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(load_workflow(&self.pool, row).await?)),
            None => Ok(None),
        }
    }

    async fn list_workflows(&self, content_id: &ContentId) -> StorageResult<Vec<Workflow>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
              FROM copydesk_workflows
             WHERE content_id = $1
             ORDER BY (superseded_at IS NOT NULL), created_at DESC
            "#
        ))
        .bind(content_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in rows {
            workflows.push(load_workflow(&self.pool, row).await?);
        }
        Ok(workflows)
    }

    async fn get_step(&self, id: &StepId) -> StorageResult<Option<ApprovalStep>> {
        let row = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM copydesk_approval_steps WHERE step_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(step_row_to_record).transpose()
    }

    async fn apply_transition(
        &self,
        transition: &StepTransition,
    ) -> StorageResult<(Content, Workflow)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM copydesk_workflows WHERE workflow_id = $1 FOR UPDATE"
        ))
        .bind(transition.workflow_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| {
            StorageError::NotFound(format!("workflow {} not found", transition.workflow_id))
        })?;

        let mut workflow = load_workflow(&mut *tx, row).await?;
        if workflow.content_id != transition.content_id {
            return Err(StorageError::InvalidInput(format!(
                "workflow {} does not belong to content {}",
                transition.workflow_id, transition.content_id
            )));
        }
        workflow
            .apply_transition(transition)
            .map_err(StorageError::Conflict)?;

        let decided = sqlx::query(
            r#"
            UPDATE copydesk_approval_steps
               SET status = $1,
                   feedback = $2,
                   decided_at = $3,
                   assignee_id = COALESCE($4, assignee_id)
             WHERE step_id = $5
               AND status = $6
            "#,
        )
        .bind(transition.decision.as_str())
        .bind(transition.feedback.as_deref())
        .bind(transition.decided_at)
        .bind(transition.assignee_id.as_ref().map(|id| id.as_str()))
        .bind(transition.step_id.as_str())
        .bind(StepStatus::InProgress.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;
        if decided.rows_affected() != 1 {
            return Err(StorageError::Conflict(format!(
                "step {} is no longer in progress",
                transition.step_id
            )));
        }

        if let Some(next) = &transition.activate_step {
            let activated = sqlx::query(
                "UPDATE copydesk_approval_steps SET status = $1 WHERE step_id = $2 AND status = $3",
            )
            .bind(StepStatus::InProgress.as_str())
            .bind(next.as_str())
            .bind(StepStatus::Pending.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
            if activated.rows_affected() != 1 {
                return Err(StorageError::Conflict(format!(
                    "step {} cannot be activated",
                    next
                )));
            }
        }

        let moved = sqlx::query(
            r#"
            UPDATE copydesk_workflows
               SET current_step_number = $1,
                   status = $2,
                   completed_at = $3
             WHERE workflow_id = $4
               AND status = $5
               AND superseded_at IS NULL
            "#,
        )
        .bind(to_i32(workflow.current_step_number)?)
        .bind(workflow.status.as_str())
        .bind(workflow.completed_at)
        .bind(workflow.id.as_str())
        .bind(WorkflowStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if moved.rows_affected() != 1 {
            return Err(StorageError::Conflict(format!(
                "workflow {} is no longer active",
                workflow.id
            )));
        }

        let content_row = sqlx::query(&format!(
            r#"
            UPDATE copydesk_content
               SET status = $1,
                   updated_at = $2
             WHERE content_id = $3
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(transition.content_status.as_str())
        .bind(transition.decided_at)
        .bind(transition.content_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| {
            StorageError::NotFound(format!("content {} not found", transition.content_id))
        })?;
        let content = content_row_to_record(content_row)?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok((content, workflow))
    }

    async fn list_in_progress_steps(&self, role: Option<Role>) -> StorageResult<Vec<ApprovalStep>> {
        let rows = sqlx::query(
            r#"
            SELECT s.step_id, s.workflow_id, s.step_number, s.step_name, s.required_role,
                   s.assignee_id, s.status, s.feedback, s.decided_at
              FROM copydesk_approval_steps s
              JOIN copydesk_workflows w ON w.workflow_id = s.workflow_id
             WHERE w.status = $1
               AND w.superseded_at IS NULL
               AND s.status = $2
               AND ($3::TEXT IS NULL OR s.required_role = $3)
             ORDER BY w.created_at, s.step_id
            "#,
        )
        .bind(WorkflowStatus::Active.as_str())
        .bind(StepStatus::InProgress.as_str())
        .bind(role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(step_row_to_record).collect()
    }
}

#[async_trait]
impl CommentStore for PostgresStorage {
    async fn append_comment(&self, comment: Comment) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO copydesk_comments (comment_id, step_id, author_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(comment.id.as_str())
        .bind(comment.step_id.as_str())
        .bind(comment.author_id.as_str())
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn list_comments(&self, step_id: &StepId) -> StorageResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT comment_id, step_id, author_id, body, created_at
              FROM copydesk_comments
             WHERE step_id = $1
             ORDER BY created_at, comment_id
            "#,
        )
        .bind(step_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(comment_row_to_record).collect()
    }
}

#[async_trait]
impl PolicyRuleRepository for PostgresStorage {
    async fn insert_rule(&self, draft: PolicyRuleDraft) -> StorageResult<PolicyRule> {
        // Position is assigned by the sequence; 0 is a placeholder until RETURNING.
        let mut rule = PolicyRule::from_draft(draft, 0)
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
        let row = sqlx::query(
            r#"
            INSERT INTO copydesk_policy_rules
                (rule_id, pattern, reason, suggestion, category, severity, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING position
            "#,
        )
        .bind(rule.id.as_str())
        .bind(&rule.pattern)
        .bind(&rule.reason)
        .bind(&rule.suggestion)
        .bind(&rule.category)
        .bind(rule.severity.as_str())
        .bind(rule.active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        let position: i64 = row
            .try_get("position")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rule.position = from_i64(position)?;
        Ok(rule)
    }

    async fn update_rule(
        &self,
        id: &PolicyRuleId,
        draft: PolicyRuleDraft,
    ) -> StorageResult<PolicyRule> {
        let mut rule = self
            .get_rule(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("policy rule {} not found", id)))?;
        rule.apply(draft)
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE copydesk_policy_rules
               SET pattern = $1,
                   reason = $2,
                   suggestion = $3,
                   category = $4,
                   severity = $5,
                   updated_at = $6
             WHERE rule_id = $7
            "#,
        )
        .bind(&rule.pattern)
        .bind(&rule.reason)
        .bind(&rule.suggestion)
        .bind(&rule.category)
        .bind(rule.severity.as_str())
        .bind(rule.updated_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "policy rule {} not found",
                id
            )));
        }
        Ok(rule)
    }

    async fn set_rule_active(&self, id: &PolicyRuleId, active: bool) -> StorageResult<PolicyRule> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE copydesk_policy_rules
               SET active = $1,
                   updated_at = $2
             WHERE rule_id = $3
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(active)
        .bind(Utc::now())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?
        .ok_or_else(|| StorageError::NotFound(format!("policy rule {} not found", id)))?;
        rule_row_to_record(row)
    }

    async fn get_rule(&self, id: &PolicyRuleId) -> StorageResult<Option<PolicyRule>> {
        let row = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM copydesk_policy_rules WHERE rule_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(rule_row_to_record).transpose()
    }

    async fn list_rules(&self, include_inactive: bool) -> StorageResult<Vec<PolicyRule>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RULE_COLUMNS}
              FROM copydesk_policy_rules
             WHERE $1 OR active
             ORDER BY position
            "#
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(rule_row_to_record).collect()
    }
}

#[async_trait]
impl ComplianceCheckStore for PostgresStorage {
    async fn append_check(&self, check: ComplianceCheck) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO copydesk_compliance_checks
                (check_id, content_id, body, is_compliant, issue_count, highest_severity, mode, checked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(check.id.as_str())
        .bind(check.content_id.as_ref().map(|id| id.as_str()))
        .bind(&check.text)
        .bind(check.is_compliant)
        .bind(to_i64(check.issue_count)?)
        .bind(check.highest_severity.map(|s| s.as_str()))
        .bind(check.mode.as_str())
        .bind(check.checked_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn list_checks(&self, window: QueryWindow) -> StorageResult<Vec<ComplianceCheck>> {
        let limit = if window.limit == 0 {
            None
        } else {
            Some(to_i64(window.limit)?)
        };
        let rows = sqlx::query(
            r#"
            SELECT check_id, content_id, body, is_compliant, issue_count, highest_severity, mode, checked_at
              FROM copydesk_compliance_checks
             ORDER BY checked_at DESC, check_id
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(check_row_to_record).collect()
    }
}

async fn load_workflow<'e, E>(executor: E, row: PgRow) -> StorageResult<Workflow>
where
    E: PgExecutor<'e>,
{
    let id: String = get(&row, "workflow_id")?;
    let steps = sqlx::query(&format!(
        "SELECT {STEP_COLUMNS} FROM copydesk_approval_steps WHERE workflow_id = $1 ORDER BY step_number"
    ))
    .bind(&id)
    .fetch_all(executor)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?
    .into_iter()
    .map(step_row_to_record)
    .collect::<StorageResult<Vec<_>>>()?;

    let current_step_number: i32 = get(&row, "current_step_number")?;
    let status: String = get(&row, "status")?;
    let content_id: String = get(&row, "content_id")?;
    Ok(Workflow {
        id: WorkflowId::new(id),
        content_id: ContentId::new(content_id),
        current_step_number: from_i32(current_step_number)?,
        status: parse(&status)?,
        steps,
        created_at: get(&row, "created_at")?,
        completed_at: get(&row, "completed_at")?,
        superseded_at: get(&row, "superseded_at")?,
    })
}

fn user_row_to_record(row: PgRow) -> StorageResult<User> {
    let role: String = get(&row, "role")?;
    Ok(User {
        id: UserId::new(get::<String>(&row, "user_id")?),
        name: get(&row, "name")?,
        email: get(&row, "email")?,
        role: parse(&role)?,
        created_at: get(&row, "created_at")?,
    })
}

fn content_row_to_record(row: PgRow) -> StorageResult<Content> {
    let status: String = get(&row, "status")?;
    let version: i32 = get(&row, "version")?;
    let compliance: Option<serde_json::Value> = get(&row, "compliance")?;
    let compliance = compliance
        .map(serde_json::from_value::<ComplianceSnapshot>)
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Content {
        id: ContentId::new(get::<String>(&row, "content_id")?),
        title: get(&row, "title")?,
        text: get(&row, "body")?,
        description: get(&row, "description")?,
        status: parse(&status)?,
        version: from_i32(version)?,
        compliance,
        creator_id: UserId::new(get::<String>(&row, "creator_id")?),
        created_at: get(&row, "created_at")?,
        updated_at: get(&row, "updated_at")?,
    })
}

fn step_row_to_record(row: PgRow) -> StorageResult<ApprovalStep> {
    let step_number: i32 = get(&row, "step_number")?;
    let role: String = get(&row, "required_role")?;
    let status: String = get(&row, "status")?;
    let assignee: Option<String> = get(&row, "assignee_id")?;
    let decided_at: Option<DateTime<Utc>> = get(&row, "decided_at")?;
    Ok(ApprovalStep {
        id: StepId::new(get::<String>(&row, "step_id")?),
        workflow_id: WorkflowId::new(get::<String>(&row, "workflow_id")?),
        step_number: from_i32(step_number)?,
        step_name: get(&row, "step_name")?,
        required_role: parse(&role)?,
        assignee_id: assignee.map(UserId::new),
        status: parse(&status)?,
        feedback: get(&row, "feedback")?,
        decided_at,
    })
}

fn comment_row_to_record(row: PgRow) -> StorageResult<Comment> {
    Ok(Comment {
        id: CommentId::new(get::<String>(&row, "comment_id")?),
        step_id: StepId::new(get::<String>(&row, "step_id")?),
        author_id: UserId::new(get::<String>(&row, "author_id")?),
        text: get(&row, "body")?,
        created_at: get(&row, "created_at")?,
    })
}

fn rule_row_to_record(row: PgRow) -> StorageResult<PolicyRule> {
    let position: i64 = get(&row, "position")?;
    let severity: String = get(&row, "severity")?;
    Ok(PolicyRule {
        id: PolicyRuleId::new(get::<String>(&row, "rule_id")?),
        pattern: get(&row, "pattern")?,
        reason: get(&row, "reason")?,
        suggestion: get(&row, "suggestion")?,
        category: get(&row, "category")?,
        severity: parse_severity(&severity)?,
        active: get(&row, "active")?,
        position: from_i64(position)?,
        created_at: get(&row, "created_at")?,
        updated_at: get(&row, "updated_at")?,
    })
}

fn check_row_to_record(row: PgRow) -> StorageResult<ComplianceCheck> {
    let content_id: Option<String> = get(&row, "content_id")?;
    let issue_count: i64 = get(&row, "issue_count")?;
    let highest: Option<String> = get(&row, "highest_severity")?;
    let mode: String = get(&row, "mode")?;
    Ok(ComplianceCheck {
        id: ComplianceCheckId::new(get::<String>(&row, "check_id")?),
        content_id: content_id.map(ContentId::new),
        text: get(&row, "body")?,
        is_compliant: get(&row, "is_compliant")?,
        issue_count: usize::try_from(issue_count)
            .map_err(|_| StorageError::Serialization("negative issue count".to_string()))?,
        highest_severity: highest.as_deref().map(parse_severity).transpose()?,
        mode: parse::<EvaluationMode>(&mode)?,
        checked_at: get(&row, "checked_at")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Backend(e.to_string()))
}

fn parse<T>(raw: &str) -> StorageResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(StorageError::Serialization)
}

fn parse_severity(raw: &str) -> StorageResult<Severity> {
    raw.parse::<Severity>()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn compliance_to_json(
    compliance: &Option<ComplianceSnapshot>,
) -> StorageResult<Option<serde_json::Value>> {
    compliance
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Unique violations become `Conflict`, foreign-key violations become
/// `InvariantViolation`.
fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StorageError::Conflict(db_err.message().to_string()),
            Some("23503") => {
                return StorageError::InvariantViolation(db_err.message().to_string())
            }
            _ => {}
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

fn from_i64(value: i64) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("unexpected negative value {value}")))
}

fn to_i32(value: u32) -> StorageResult<i32> {
    i32::try_from(value)
        .map_err(|_| StorageError::InvalidInput(format!("value {value} out of range")))
}

fn from_i32(value: i32) -> StorageResult<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("unexpected negative value {value}")))
}
