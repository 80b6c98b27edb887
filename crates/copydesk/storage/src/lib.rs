//! Copydesk storage abstractions.
//!
//! This crate defines the persistence contract for the approval service:
//! - users and content items (system of record)
//! - approval workflows with their ordered steps, including superseded history
//! - append-only step comments
//! - policy rules
//! - the append-only compliance-check audit log
//!
//! Every workflow mutation is a single compare-and-set operation: a submission
//! or a step decision either commits all of its row changes or none of them.
//! Adapters are constructed explicitly and injected as `Arc<dyn Storage>`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use traits::{
    CommentStore, ComplianceCheckStore, ContentGuard, ContentStore, PolicyRuleRepository,
    QueryWindow, Storage, UserStore, WorkflowStore,
};
