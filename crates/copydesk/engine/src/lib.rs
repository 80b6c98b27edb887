//! Copydesk workflow engine.
//!
//! Drives content through its lifecycle:
//!
//! ```text
//! DRAFT ──submit──▶ PENDING_REVIEW ──approve──▶ IN_REVIEW ──approve(last)──▶ APPROVED ──publish──▶ PUBLISHED
//!   ▲                     │                          │
//!   └──edit── CHANGES_REQUESTED ◀──────reject────────┘
//! ```
//!
//! Submission is gated by the stored compliance verdict. Each approval step
//! requires an exact role match. Transitions on one content item are
//! serialised in-process and committed by storage as a single
//! compare-and-set, so racing decisions yield one success and one
//! [`EngineError::StateConflict`].

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod authorizer;
mod config;
mod engine;
mod error;
mod locks;

pub use authorizer::{Forbidden, RoleAuthorizer};
pub use config::EngineConfig;
pub use engine::{ContentEdit, NewContent, PendingApproval, StepOutcome, WorkflowEngine};
pub use error::{EngineError, EngineResult};
