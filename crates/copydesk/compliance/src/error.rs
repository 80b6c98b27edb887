use copydesk_storage::StorageError;
use thiserror::Error;

pub type Result<T, E = ComplianceError> = std::result::Result<T, E>;

/// Compliance evaluation errors.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("policy rule not found: {0}")]
    RuleNotFound(String),

    /// The reasoning backend or retrieval collaborator failed. Callers of
    /// [`crate::ComplianceService::check`] never see this: it degrades to the
    /// manual-review verdict.
    #[error("evaluator unavailable: {0}")]
    EvaluatorUnavailable(String),

    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
