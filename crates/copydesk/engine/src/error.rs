use copydesk_compliance::ComplianceError;
use copydesk_storage::StorageError;
use copydesk_types::{ContentStatus, Issue, Role};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Workflow engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The aggregate is not in a state that permits the operation, or a
    /// concurrent transition won the race.
    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("role mismatch: step requires {required}, user has {actual}")]
    RoleMismatch { required: Role, actual: Role },

    #[error("submission blocked by {} high-severity issue(s)", .issues.len())]
    Blocked { issues: Vec<Issue> },

    #[error("feedback is required when rejecting a step")]
    MissingFeedback,

    #[error("content is {0}, only APPROVED content can be published")]
    NotApproved(ContentStatus),

    #[error("an acting user is required")]
    IdentityRequired,

    #[error("only the creator may edit this content")]
    NotOwner,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => EngineError::NotFound(msg),
            StorageError::Conflict(msg) => EngineError::StateConflict(msg),
            StorageError::InvalidInput(msg) | StorageError::InvariantViolation(msg) => {
                EngineError::InvalidInput(msg)
            }
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<ComplianceError> for EngineError {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::InvalidInput(msg) => EngineError::InvalidInput(msg),
            ComplianceError::RuleNotFound(id) => {
                EngineError::NotFound(format!("policy rule {id} not found"))
            }
            ComplianceError::Storage(err) => err.into(),
            other => EngineError::Storage(other.to_string()),
        }
    }
}
