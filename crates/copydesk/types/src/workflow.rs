//! Approval workflows and their steps
//!
//! A [`Workflow`] is the ordered chain of role-gated [`ApprovalStep`]s attached
//! to one content item. Steps are instantiated in bulk from a
//! [`StepTemplate`] list; step 1 starts `InProgress`, the rest `Pending`.
//!
//! State changes are expressed as a [`StepTransition`] plan computed by the
//! engine and applied atomically by storage, so a decision either fully
//! commits or leaves the aggregate untouched.

use crate::{ContentId, ContentStatus, Role, StepId, UserId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Status enums ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Active,
    Completed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Active => "ACTIVE",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(WorkflowStatus::Active),
            "COMPLETED" => Ok(WorkflowStatus::Completed),
            "CANCELLED" => Ok(WorkflowStatus::Cancelled),
            other => Err(format!("unknown workflow status '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Approved => "APPROVED",
            StepStatus::Rejected => "REJECTED",
            StepStatus::Skipped => "SKIPPED",
        }
    }

    /// A step never reopens once decided.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Approved | StepStatus::Rejected)
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StepStatus::Pending),
            "IN_PROGRESS" => Ok(StepStatus::InProgress),
            "APPROVED" => Ok(StepStatus::Approved),
            "REJECTED" => Ok(StepStatus::Rejected),
            "SKIPPED" => Ok(StepStatus::Skipped),
            other => Err(format!("unknown step status '{}'", other)),
        }
    }
}

// ── Template ─────────────────────────────────────────────────────────

/// One entry of the per-deployment approval chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,
    pub role: Role,
}

impl StepTemplate {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    /// Manager → Legal → Executive
    pub fn default_chain() -> Vec<StepTemplate> {
        vec![
            StepTemplate::new("Manager Review", Role::Manager),
            StepTemplate::new("Legal Review", Role::Legal),
            StepTemplate::new("Executive Approval", Role::Executive),
        ]
    }
}

// ── Approval Step ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub workflow_id: WorkflowId,
    /// 1-based, unique and strictly increasing within the workflow
    pub step_number: u32,
    pub step_name: String,
    pub required_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

// ── Workflow ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub content_id: ContentId,
    pub current_step_number: u32,
    pub status: WorkflowStatus,
    /// Ordered by `step_number`
    pub steps: Vec<ApprovalStep>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when a resubmission replaced this workflow; it is then history only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Instantiate a fresh workflow from the step template.
    ///
    /// Returns `None` for an empty template: a workflow needs at least one step.
    pub fn from_template(content_id: ContentId, template: &[StepTemplate]) -> Option<Self> {
        if template.is_empty() {
            return None;
        }
        let id = WorkflowId::generate();
        let steps = template
            .iter()
            .enumerate()
            .map(|(idx, entry)| ApprovalStep {
                id: StepId::generate(),
                workflow_id: id.clone(),
                step_number: idx as u32 + 1,
                step_name: entry.name.clone(),
                required_role: entry.role,
                assignee_id: None,
                status: if idx == 0 {
                    StepStatus::InProgress
                } else {
                    StepStatus::Pending
                },
                feedback: None,
                decided_at: None,
            })
            .collect();

        Some(Self {
            id,
            content_id,
            current_step_number: 1,
            status: WorkflowStatus::Active,
            steps,
            created_at: Utc::now(),
            completed_at: None,
            superseded_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    pub fn is_current(&self) -> bool {
        self.superseded_at.is_none()
    }

    pub fn step(&self, step_id: &StepId) -> Option<&ApprovalStep> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    pub fn step_by_number(&self, step_number: u32) -> Option<&ApprovalStep> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    pub fn in_progress_step(&self) -> Option<&ApprovalStep> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
    }

    /// Check the single-in-progress-step invariant.
    ///
    /// Active workflows have exactly one `InProgress` step, numbered
    /// `current_step_number`; terminal workflows have none.
    pub fn check_invariant(&self) -> Result<(), String> {
        let in_progress: Vec<&ApprovalStep> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .collect();

        match (self.status, in_progress.as_slice()) {
            (WorkflowStatus::Active, [step]) if step.step_number == self.current_step_number => {
                Ok(())
            }
            (WorkflowStatus::Active, [step]) => Err(format!(
                "in-progress step {} does not match current step {}",
                step.step_number, self.current_step_number
            )),
            (WorkflowStatus::Active, steps) => Err(format!(
                "active workflow has {} in-progress steps",
                steps.len()
            )),
            (_, []) => Ok(()),
            (status, steps) => Err(format!(
                "{} workflow still has {} in-progress steps",
                status.as_str(),
                steps.len()
            )),
        }
    }

    /// Apply a decision plan in place.
    ///
    /// Fails without modifying anything if the step is no longer in progress
    /// or the workflow is no longer active.
    pub fn apply_transition(&mut self, transition: &StepTransition) -> Result<(), String> {
        if transition.workflow_id != self.id {
            return Err(format!(
                "transition targets workflow {}, not {}",
                transition.workflow_id, self.id
            ));
        }
        if !self.is_active() || !self.is_current() {
            return Err(format!("workflow {} is no longer active", self.id));
        }
        let idx = self
            .steps
            .iter()
            .position(|s| s.id == transition.step_id)
            .ok_or_else(|| format!("step {} not in workflow {}", transition.step_id, self.id))?;
        if self.steps[idx].status != StepStatus::InProgress {
            return Err(format!(
                "step {} is {}, expected IN_PROGRESS",
                transition.step_id,
                self.steps[idx].status.as_str()
            ));
        }
        let next_idx = match &transition.activate_step {
            Some(next_id) => {
                let pos = self
                    .steps
                    .iter()
                    .position(|s| &s.id == next_id)
                    .ok_or_else(|| format!("step {} not in workflow {}", next_id, self.id))?;
                if self.steps[pos].status != StepStatus::Pending {
                    return Err(format!("step {} cannot be activated", next_id));
                }
                Some(pos)
            }
            None => None,
        };

        let step = &mut self.steps[idx];
        step.status = transition.decision;
        step.decided_at = Some(transition.decided_at);
        step.feedback = transition.feedback.clone();
        if transition.assignee_id.is_some() {
            step.assignee_id = transition.assignee_id.clone();
        }
        if let Some(pos) = next_idx {
            self.steps[pos].status = StepStatus::InProgress;
        }
        self.current_step_number = transition.current_step_number;
        self.status = transition.workflow_status;
        if transition.workflow_status != WorkflowStatus::Active {
            self.completed_at = Some(transition.decided_at);
        }
        Ok(())
    }
}

// ── Transition plan ──────────────────────────────────────────────────

/// A fully computed step decision, applied as one unit by storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTransition {
    pub workflow_id: WorkflowId,
    pub content_id: ContentId,
    pub step_id: StepId,
    /// `Approved` or `Rejected`
    pub decision: StepStatus,
    pub assignee_id: Option<UserId>,
    pub feedback: Option<String>,
    pub decided_at: DateTime<Utc>,
    /// Next step to move to `InProgress`, if any
    pub activate_step: Option<StepId>,
    pub current_step_number: u32,
    pub workflow_status: WorkflowStatus,
    pub content_status: ContentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> Workflow {
        Workflow::from_template(ContentId::new("c1"), &StepTemplate::default_chain()).unwrap()
    }

    fn approve(wf: &Workflow, number: u32) -> StepTransition {
        let step = wf.step_by_number(number).unwrap();
        let next = wf.step_by_number(number + 1);
        StepTransition {
            workflow_id: wf.id.clone(),
            content_id: wf.content_id.clone(),
            step_id: step.id.clone(),
            decision: StepStatus::Approved,
            assignee_id: Some(UserId::new("u")),
            feedback: None,
            decided_at: Utc::now(),
            activate_step: next.map(|s| s.id.clone()),
            current_step_number: next.map(|s| s.step_number).unwrap_or(number),
            workflow_status: if next.is_some() {
                WorkflowStatus::Active
            } else {
                WorkflowStatus::Completed
            },
            content_status: if next.is_some() {
                ContentStatus::InReview
            } else {
                ContentStatus::Approved
            },
        }
    }

    #[test]
    fn template_creates_first_step_in_progress() {
        let wf = workflow();
        assert_eq!(wf.steps.len(), 3);
        assert_eq!(wf.steps[0].status, StepStatus::InProgress);
        assert!(wf.steps[1..].iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(wf.steps[2].required_role, Role::Executive);
        assert!(wf.check_invariant().is_ok());
    }

    #[test]
    fn empty_template_yields_no_workflow() {
        assert!(Workflow::from_template(ContentId::new("c1"), &[]).is_none());
    }

    #[test]
    fn transitions_preserve_invariant() {
        let mut wf = workflow();
        for number in 1..=3 {
            let t = approve(&wf, number);
            wf.apply_transition(&t).unwrap();
            wf.check_invariant().unwrap();
        }
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(wf.completed_at.is_some());
        assert!(wf.in_progress_step().is_none());
    }

    #[test]
    fn replaying_a_decision_is_refused() {
        let mut wf = workflow();
        let t = approve(&wf, 1);
        wf.apply_transition(&t).unwrap();
        let before = wf.clone();
        assert!(wf.apply_transition(&t).is_err());
        assert_eq!(wf, before);
    }

    #[test]
    fn invariant_detects_two_in_progress_steps() {
        let mut wf = workflow();
        wf.steps[1].status = StepStatus::InProgress;
        assert!(wf.check_invariant().is_err());
    }
}
