//! Confidence scoring for generated suggestions

use super::types::ConfidenceInputs;

/// Weights for confidence components
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceWeights {
    /// Weight for retrieved-context relevance (default: 0.40)
    pub context_relevance: f64,
    /// Weight for internal signal consistency (default: 0.30)
    pub signal_consistency: f64,
    /// Weight for the rule pass ratio (default: 0.20)
    pub rule_validation: f64,
    /// Weight for model self-evaluation (default: 0.10)
    pub self_evaluation: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        super::DEFAULT_WEIGHTS
    }
}

/// Per-component values behind one confidence score
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidenceBreakdown {
    pub context_relevance: f64,
    pub signal_consistency: f64,
    pub rule_validation: f64,
    pub self_evaluation: f64,
    pub total: f64,
}

/// Multi-signal confidence scorer
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
}

impl ConfidenceScorer {
    /// Create a new scorer with default weights
    pub fn new() -> Self {
        Self { weights: ConfidenceWeights::default() }
    }

    /// Create with custom weights
    pub fn with_weights(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    /// Composite confidence clamped to [0, 1]
    pub fn calculate_confidence(&self, inputs: &ConfidenceInputs) -> f64 {
        self.breakdown(inputs).total
    }

    pub fn breakdown(&self, inputs: &ConfidenceInputs) -> ConfidenceBreakdown {
        let context_relevance = context_relevance(&inputs.context_scores);
        let signal_consistency = signal_consistency(inputs);
        let rule_validation = rule_validation_ratio(&inputs.rule_results);
        let self_evaluation = sanitize(inputs.self_evaluation);

        let total = context_relevance * self.weights.context_relevance
            + signal_consistency * self.weights.signal_consistency
            + rule_validation * self.weights.rule_validation
            + self_evaluation * self.weights.self_evaluation;

        ConfidenceBreakdown {
            context_relevance,
            signal_consistency,
            rule_validation,
            self_evaluation,
            total: sanitize(total),
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean similarity, floored at 0.3 (also the value for no context).
pub fn context_relevance(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return super::CONTEXT_RELEVANCE_FLOOR;
    }

    let mean = scores.iter().map(|score| sanitize(*score)).sum::<f64>() / scores.len() as f64;
    mean.max(super::CONTEXT_RELEVANCE_FLOOR)
}

/// Starts at 1.0 and loses points for contradictory analysis signals.
pub fn signal_consistency(inputs: &ConfidenceInputs) -> f64 {
    let analysis = &inputs.analysis;
    let sentiment = analysis.sentiment.trim().to_ascii_lowercase();
    let intent = analysis.intent.trim().to_ascii_lowercase();
    let mut consistency: f64 = 1.0;

    if analysis.objections.len() > 2 {
        consistency -= 0.2;
    }
    if sentiment == "positive" && intent == "complaint" {
        consistency -= 0.3;
    }
    if sentiment == "negative" && intent == "buying" {
        consistency -= 0.2;
    }
    if analysis.emotions.len() > 3 {
        consistency -= 0.1;
    }

    consistency.max(0.0)
}

/// Fraction of passing rules; 0.5 when nothing was evaluated, floored at 0.3 below 0.5.
pub fn rule_validation_ratio(results: &[bool]) -> f64 {
    if results.is_empty() {
        return 0.5;
    }

    let passed = results.iter().filter(|passed| **passed).count();
    let ratio = passed as f64 / results.len() as f64;
    if ratio < 0.5 {
        ratio.max(super::RULE_RATIO_FLOOR)
    } else {
        ratio
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
