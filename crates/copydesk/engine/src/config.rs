use crate::{EngineError, EngineResult};
use copydesk_types::StepTemplate;
use serde::{Deserialize, Serialize};

/// Per-deployment workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ordered approval chain instantiated on every submission
    pub step_template: Vec<StepTemplate>,

    /// Refuse approve/reject calls that do not name an acting user
    pub enforce_identity: bool,

    /// Feed retrieved policy context to the evaluator
    pub use_context: bool,

    /// Buffered workflow events per subscriber
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_template: StepTemplate::default_chain(),
            enforce_identity: false,
            use_context: true,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.step_template.is_empty() {
            return Err(EngineError::InvalidInput(
                "step template must contain at least one step".to_string(),
            ));
        }
        if let Some(step) = self
            .step_template
            .iter()
            .find(|step| step.name.trim().is_empty())
        {
            return Err(EngineError::InvalidInput(format!(
                "step for role {} has an empty name",
                step.role
            )));
        }
        if self.event_capacity == 0 {
            return Err(EngineError::InvalidInput(
                "event capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
