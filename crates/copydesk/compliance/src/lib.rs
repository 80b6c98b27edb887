//! Copydesk compliance evaluation.
//!
//! Decides whether a piece of marketing copy may enter the approval workflow:
//!
//! - [`PolicyRuleStore`] serves active rules through a read-through cache
//! - [`RuleSet`] performs the deterministic match and rewrite
//! - [`ComplianceEvaluator`] implementations produce a [`ComplianceResult`],
//!   optionally delegating to a [`ReasoningBackend`] when retrieved policy
//!   context is available
//! - [`ComplianceGate`] is the pure submission decision
//! - [`ComplianceService`] ties retrieval, evaluation and the audit log together
//!
//! [`ComplianceResult`]: copydesk_types::ComplianceResult

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod backend;
mod error;
mod evaluator;
mod gate;
mod matcher;
mod retrieval;
mod rules;
mod seed;
mod service;

pub use backend::{AssessmentRequest, HttpReasoningBackend, ReasoningBackend};
pub use error::{ComplianceError, Result};
pub use evaluator::{
    ComplianceEvaluator, ContextAugmentedEvaluator, Evaluation, RuleMatchingEvaluator,
};
pub use gate::{ComplianceGate, GateDecision};
pub use matcher::RuleSet;
pub use retrieval::{
    DocumentIngestion, InMemoryPolicyIndex, NoopRetrieval, RetrievedPassage, Retrieval,
};
pub use rules::PolicyRuleStore;
pub use seed::demo_rules;
pub use service::{ComplianceService, ComplianceSettings};
