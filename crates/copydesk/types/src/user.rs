//! Users, roles and step comments

use crate::{CommentId, StepId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's single role. Authorization is exact equality, no hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Creator,
    Manager,
    Legal,
    Executive,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "CREATOR",
            Role::Manager => "MANAGER",
            Role::Legal => "LEGAL",
            Role::Executive => "EXECUTIVE",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATOR" => Ok(Role::Creator),
            "MANAGER" => Ok(Role::Manager),
            "LEGAL" => Ok(Role::Legal),
            "EXECUTIVE" => Ok(Role::Executive),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique across users
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::generate(),
            name: name.into(),
            email: email.into().trim().to_lowercase(),
            role,
            created_at: Utc::now(),
        }
    }
}

/// Append-only remark attached to an approval step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub step_id: StepId,
    pub author_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(step_id: StepId, author_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: CommentId::generate(),
            step_id,
            author_id,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("legal".parse::<Role>().unwrap(), Role::Legal);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn email_is_normalized() {
        let user = User::new("Ada", " Ada@Example.COM ", Role::Manager);
        assert_eq!(user.email, "ada@example.com");
    }
}
