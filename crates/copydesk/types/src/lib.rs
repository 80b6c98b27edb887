//! Copydesk domain types
//!
//! Shared vocabulary for the compliance gate and the sequential approval
//! workflow:
//!
//! - [`PolicyRule`] / [`Severity`]: pattern rules the evaluator matches against
//! - [`ComplianceResult`] / [`Issue`]: the verdict produced by an evaluation
//! - [`Content`] / [`ContentStatus`]: marketing copy and its lifecycle
//! - [`Workflow`] / [`ApprovalStep`]: the ordered, role-gated approval chain
//! - [`User`] / [`Role`] / [`Comment`]: actors and their audit trail
//! - [`WorkflowEvent`]: change notifications emitted on committed transitions

#![deny(unsafe_code)]

mod content;
mod event;
mod ids;
mod policy;
mod user;
mod workflow;

pub use content::{ComplianceSnapshot, Content, ContentStatus};
pub use event::WorkflowEvent;
pub use ids::{CommentId, ComplianceCheckId, ContentId, PolicyRuleId, StepId, UserId, WorkflowId};
pub use policy::{
    ComplianceCheck, ComplianceResult, EvaluationMode, Issue, PolicyRule, PolicyRuleDraft,
    RuleValidationError, Severity,
};
pub use user::{Comment, Role, User};
pub use workflow::{
    ApprovalStep, StepStatus, StepTemplate, StepTransition, Workflow, WorkflowStatus,
};
