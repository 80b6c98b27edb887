//! Error types for copydeskd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use copydesk_compliance::ComplianceError;
use copydesk_engine::EngineError;
use copydesk_storage::StorageError;
use copydesk_types::{ContentStatus, Issue, Role};
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Compliance wiring error
    #[error("Compliance error: {0}")]
    Compliance(#[from] ComplianceError),

    /// Engine construction error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Feedback is required when rejecting a step")]
    MissingFeedback,

    #[error("An acting user is required")]
    IdentityRequired,

    #[error("Role mismatch: step requires {required}, user has {actual}")]
    RoleMismatch { required: Role, actual: Role },

    #[error("Only the creator may edit this content")]
    NotOwner,

    /// Conflict with the current state, including lost races
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Content is {0}, only APPROVED content can be published")]
    NotApproved(ContentStatus),

    /// Submission refused by the compliance gate
    #[error("Submission blocked by {} high-severity issue(s)", .issues.len())]
    Blocked { issues: Vec<Issue> },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::MissingFeedback => (StatusCode::BAD_REQUEST, "MISSING_FEEDBACK"),
            ApiError::IdentityRequired => (StatusCode::UNAUTHORIZED, "IDENTITY_REQUIRED"),
            ApiError::RoleMismatch { .. } => (StatusCode::FORBIDDEN, "ROLE_MISMATCH"),
            ApiError::NotOwner => (StatusCode::FORBIDDEN, "NOT_OWNER"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "STATE_CONFLICT"),
            ApiError::NotApproved(_) => (StatusCode::CONFLICT, "NOT_APPROVED"),
            ApiError::Blocked { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "COMPLIANCE_BLOCKED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::RoleMismatch { required, actual } => Some(serde_json::json!({
                "required_role": required,
                "actual_role": actual,
            })),
            ApiError::NotApproved(status) => Some(serde_json::json!({ "status": status })),
            ApiError::Blocked { issues } => Some(serde_json::json!({ "issues": issues })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            EngineError::NotFound(msg) => ApiError::NotFound(msg),
            EngineError::StateConflict(msg) => ApiError::Conflict(msg),
            EngineError::RoleMismatch { required, actual } => {
                ApiError::RoleMismatch { required, actual }
            }
            EngineError::Blocked { issues } => ApiError::Blocked { issues },
            EngineError::MissingFeedback => ApiError::MissingFeedback,
            EngineError::NotApproved(status) => ApiError::NotApproved(status),
            EngineError::IdentityRequired => ApiError::IdentityRequired,
            EngineError::NotOwner => ApiError::NotOwner,
            EngineError::Storage(msg) => ApiError::Storage(msg),
        }
    }
}

impl From<ComplianceError> for ApiError {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::InvalidInput(msg) => ApiError::BadRequest(msg),
            ComplianceError::RuleNotFound(id) => {
                ApiError::NotFound(format!("policy rule {id} not found"))
            }
            ComplianceError::Storage(err) => EngineError::from(err).into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
