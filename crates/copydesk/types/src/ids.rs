//! Identifiers
//!
//! All identifiers are UUID-v4 strings wrapped in dedicated newtypes so a
//! step id can never be passed where a content id is expected.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn short(&self) -> &str {
                &self.0[..8.min(self.0.len())]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a user
    UserId
);
string_id!(
    /// Unique identifier for a content item
    ContentId
);
string_id!(
    /// Unique identifier for an approval workflow
    WorkflowId
);
string_id!(
    /// Unique identifier for an approval step
    StepId
);
string_id!(
    /// Unique identifier for a step comment
    CommentId
);
string_id!(
    /// Unique identifier for a policy rule
    PolicyRuleId
);
string_id!(
    /// Unique identifier for a compliance-check audit record
    ComplianceCheckId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ContentId::generate(), ContentId::generate());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = StepId::new("step-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"step-1\"");
        assert_eq!(id.short(), "step-1");
    }
}
