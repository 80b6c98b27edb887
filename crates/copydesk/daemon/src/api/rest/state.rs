//! Application state for API handlers

use copydesk_compliance::{ComplianceService, DocumentIngestion};
use copydesk_engine::WorkflowEngine;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Workflow engine; also owns the compliance service
    pub engine: Arc<WorkflowEngine>,

    /// Sink for policy documents used as retrieval context
    pub documents: Arc<dyn DocumentIngestion>,

    /// Name of the configured storage backend
    pub storage_backend: &'static str,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        engine: Arc<WorkflowEngine>,
        documents: Arc<dyn DocumentIngestion>,
        storage_backend: &'static str,
    ) -> Self {
        Self {
            engine,
            documents,
            storage_backend,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn compliance(&self) -> &Arc<ComplianceService> {
        self.engine.compliance()
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
