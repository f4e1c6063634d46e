//! Types for agent-assist reply suggestions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationId, ConversationMetadata, MessageId};
use crate::domain::TenantId;

/// A validated, scored reply suggestion as returned to agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Reply text after policy corrections
    pub text: String,
    /// Composite confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Whether the reply recommends at least one product
    pub product_match: bool,
    /// Product names the reply recommends
    #[serde(default)]
    pub product_recommendations: Vec<String>,
    /// Model-supplied rationale
    #[serde(default)]
    pub reasoning: String,
}

/// One unvalidated candidate as emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub text: String,
    /// Model self-reported confidence; clamped before use.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub product_recommendations: Vec<String>,
}

/// Identifies one unit of conversation progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionCacheKey {
    pub conversation_id: ConversationId,
    pub last_message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionCacheEntry {
    pub tenant_id: TenantId,
    pub key: SuggestionCacheKey,
    pub suggestions: Vec<Suggestion>,
    pub context_used: bool,
    pub created_at: DateTime<Utc>,
}

/// Response envelope for a suggestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<Suggestion>,
    pub context_used: bool,
    pub metadata: Option<ConversationMetadata>,
}

impl SuggestionResponse {
    pub fn empty(metadata: Option<ConversationMetadata>) -> Self {
        Self { suggestions: Vec::new(), context_used: false, metadata }
    }

    /// Highest-confidence suggestion at or above `threshold`.
    pub fn best_at_or_above(&self, threshold: f64) -> Option<&Suggestion> {
        self.suggestions
            .iter()
            .filter(|suggestion| suggestion.confidence >= threshold)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Signals combined into a suggestion's confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceInputs {
    pub analysis: ConversationMetadata,
    /// Similarity of each retrieved knowledge chunk (0.0 - 1.0)
    pub context_scores: Vec<f64>,
    /// Pass/fail per evaluated policy rule
    pub rule_results: Vec<bool>,
    /// Model self-reported confidence (0.0 - 1.0)
    pub self_evaluation: f64,
}
