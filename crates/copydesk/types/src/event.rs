//! Change notifications for committed transitions

use crate::{ContentId, ContentStatus, StepId, UserId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted after a transition has been committed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ContentCreated {
        content_id: ContentId,
        creator_id: UserId,
        at: DateTime<Utc>,
    },
    ContentEdited {
        content_id: ContentId,
        version: u32,
        at: DateTime<Utc>,
    },
    Submitted {
        content_id: ContentId,
        workflow_id: WorkflowId,
        at: DateTime<Utc>,
    },
    StepApproved {
        content_id: ContentId,
        workflow_id: WorkflowId,
        step_id: StepId,
        step_number: u32,
        content_status: ContentStatus,
        at: DateTime<Utc>,
    },
    StepRejected {
        content_id: ContentId,
        workflow_id: WorkflowId,
        step_id: StepId,
        step_number: u32,
        at: DateTime<Utc>,
    },
    Published {
        content_id: ContentId,
        at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Stable name of the variant, matching its serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::ContentCreated { .. } => "content_created",
            WorkflowEvent::ContentEdited { .. } => "content_edited",
            WorkflowEvent::Submitted { .. } => "submitted",
            WorkflowEvent::StepApproved { .. } => "step_approved",
            WorkflowEvent::StepRejected { .. } => "step_rejected",
            WorkflowEvent::Published { .. } => "published",
        }
    }

    pub fn content_id(&self) -> &ContentId {
        match self {
            WorkflowEvent::ContentCreated { content_id, .. }
            | WorkflowEvent::ContentEdited { content_id, .. }
            | WorkflowEvent::Submitted { content_id, .. }
            | WorkflowEvent::StepApproved { content_id, .. }
            | WorkflowEvent::StepRejected { content_id, .. }
            | WorkflowEvent::Published { content_id, .. } => content_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serialized_tag() {
        let event = WorkflowEvent::StepApproved {
            content_id: ContentId::new("c1"),
            workflow_id: WorkflowId::new("w1"),
            step_id: StepId::new("s1"),
            step_number: 2,
            content_status: ContentStatus::InReview,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["content_status"], "IN_REVIEW");
        assert_eq!(event.content_id().as_str(), "c1");
    }
}
