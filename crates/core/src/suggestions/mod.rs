//! Agent-assist reply suggestions
//!
//! Types shared by the suggestion pipeline, the multi-signal confidence
//! scorer, and tolerant parsing of model output.

mod parse;
mod scoring;
mod types;

pub use parse::{parse_candidates, parse_json_payload, ParsedCandidates};
pub use scoring::{
    context_relevance, rule_validation_ratio, signal_consistency, ConfidenceBreakdown,
    ConfidenceScorer, ConfidenceWeights,
};
pub use types::*;

/// Default confidence weights
pub const DEFAULT_WEIGHTS: ConfidenceWeights = ConfidenceWeights {
    context_relevance: 0.40,
    signal_consistency: 0.30,
    rule_validation: 0.20,
    self_evaluation: 0.10,
};

/// Context relevance used when nothing was retrieved, and the floor otherwise
pub const CONTEXT_RELEVANCE_FLOOR: f64 = 0.3;

/// Lowest rule validation ratio once at least one rule failed
pub const RULE_RATIO_FLOOR: f64 = 0.3;

/// Confidence assigned to raw text when model output is not a JSON array
pub const FALLBACK_CANDIDATE_CONFIDENCE: f64 = 0.7;

/// Knowledge chunks retrieved per request
pub const DEFAULT_CONTEXT_TOP_K: usize = 5;
