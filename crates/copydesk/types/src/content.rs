//! Content items and their lifecycle status

use crate::{ComplianceResult, ContentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a content item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Draft,
    PendingReview,
    InReview,
    ChangesRequested,
    Approved,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "DRAFT",
            ContentStatus::PendingReview => "PENDING_REVIEW",
            ContentStatus::InReview => "IN_REVIEW",
            ContentStatus::ChangesRequested => "CHANGES_REQUESTED",
            ContentStatus::Approved => "APPROVED",
            ContentStatus::Published => "PUBLISHED",
        }
    }

    /// Text, title and description may only change in these states.
    pub fn is_editable(&self) -> bool {
        matches!(self, ContentStatus::Draft | ContentStatus::ChangesRequested)
    }

    /// Submission is refused once the content has been approved.
    /// Submitting while a review is running resets the workflow.
    pub fn accepts_submission(&self) -> bool {
        !matches!(self, ContentStatus::Approved | ContentStatus::Published)
    }

    /// Under review by the approval chain
    pub fn is_in_workflow(&self) -> bool {
        matches!(self, ContentStatus::PendingReview | ContentStatus::InReview)
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(ContentStatus::Draft),
            "PENDING_REVIEW" => Ok(ContentStatus::PendingReview),
            "IN_REVIEW" => Ok(ContentStatus::InReview),
            "CHANGES_REQUESTED" => Ok(ContentStatus::ChangesRequested),
            "APPROVED" => Ok(ContentStatus::Approved),
            "PUBLISHED" => Ok(ContentStatus::Published),
            other => Err(format!("unknown content status '{}'", other)),
        }
    }
}

/// The verdict that gated (or will gate) a submission, pinned to the text
/// version it was computed for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub result: ComplianceResult,
    pub content_version: u32,
}

/// A piece of marketing copy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub description: String,
    pub status: ContentStatus,
    /// Starts at 1, incremented on every text change
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceSnapshot>,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    pub fn new(
        title: impl Into<String>,
        text: impl Into<String>,
        description: impl Into<String>,
        creator_id: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ContentId::generate(),
            title: title.into(),
            text: text.into(),
            description: description.into(),
            status: ContentStatus::Draft,
            version: 1,
            compliance: None,
            creator_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pin a verdict to the current text version.
    pub fn attach_compliance(&mut self, result: ComplianceResult) {
        self.compliance = Some(ComplianceSnapshot {
            result,
            content_version: self.version,
        });
        self.updated_at = Utc::now();
    }

    /// Replace the text. Returns `true` if the text actually changed, in which
    /// case the version is bumped and the previous verdict no longer applies.
    pub fn replace_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.text {
            return false;
        }
        self.text = text;
        self.version += 1;
        self.updated_at = Utc::now();
        true
    }

    /// The stored verdict, if it was computed for this (or a newer) version.
    pub fn current_compliance(&self) -> Option<&ComplianceResult> {
        self.compliance
            .as_ref()
            .filter(|snapshot| snapshot.content_version >= self.version)
            .map(|snapshot| &snapshot.result)
    }
}
