//! Deterministic policy layer applied to every piece of model-originated text.
//!
//! The model is never trusted: suggestion text is validated (and possibly
//! rewritten) against tenant rules, and objection claims from conversation
//! analysis are kept only when the raw transcript corroborates them.

mod engine;
pub mod objections;

pub use engine::DeterministicPolicyEngine;
pub use objections::validate_objections;

use crate::domain::rule::{Rule, ValidationResult};

pub trait PolicyEngine: Send + Sync {
    fn validate_output(&self, text: &str, rules: &[Rule]) -> ValidationResult;
}
