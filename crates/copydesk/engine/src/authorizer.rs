use copydesk_types::{Role, User};
use thiserror::Error;

/// The acting user's role does not match the step's required role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("forbidden: {required} required, {actual} presented")]
pub struct Forbidden {
    pub required: Role,
    pub actual: Role,
}

/// Stateless exact-role check. There is no hierarchy: ADMIN does not
/// implicitly hold any other role.
pub struct RoleAuthorizer;

impl RoleAuthorizer {
    pub fn authorize(user: &User, required: Role) -> Result<(), Forbidden> {
        if user.role == required {
            Ok(())
        } else {
            Err(Forbidden {
                required,
                actual: user.role,
            })
        }
    }
}

impl From<Forbidden> for crate::EngineError {
    fn from(err: Forbidden) -> Self {
        crate::EngineError::RoleMismatch {
            required: err.required,
            actual: err.actual,
        }
    }
}
