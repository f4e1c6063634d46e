use std::sync::Arc;

use chrono::Utc;
use parley_core::domain::conversation::{ConversationId, ConversationMetadata, Sender};
use parley_core::domain::TenantId;
use parley_core::errors::ApplicationError;
use parley_core::policy::validate_objections;
use parley_core::store::ConversationStore;
use parley_core::suggestions::parse_json_payload;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::ModelClient;
use crate::prompts::analysis_prompt;

#[derive(Debug, Default, Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    emotions: Vec<String>,
    #[serde(default)]
    objections: Vec<String>,
}

/// Background analysis that keeps the conversation metadata snapshot current.
pub struct ConversationAnalyzer {
    conversations: Arc<dyn ConversationStore>,
    model: Arc<dyn ModelClient>,
}

impl ConversationAnalyzer {
    pub fn new(conversations: Arc<dyn ConversationStore>, model: Arc<dyn ModelClient>) -> Self {
        Self { conversations, model }
    }

    /// Returns the stored snapshot, or `None` when analysis was skipped.
    pub async fn analyze(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, ApplicationError> {
        let messages = self.conversations.get_messages(tenant_id, conversation_id).await?;
        if messages.is_empty() {
            return Ok(None);
        }

        let raw = match self.model.generate_text(&analysis_prompt(&messages), "").await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "analysis.skipped",
                    tenant_id = %tenant_id.0,
                    conversation_id = %conversation_id.0,
                    error_class = error.class_label(),
                    error = %error,
                    "conversation analysis skipped"
                );
                return Ok(None);
            }
        };

        let Some(payload) = parse_analysis(&raw) else {
            warn!(
                event_name = "analysis.malformed",
                tenant_id = %tenant_id.0,
                conversation_id = %conversation_id.0,
                "model analysis was not a JSON object"
            );
            return Ok(None);
        };

        let customer_text = messages
            .iter()
            .filter(|message| message.sender == Sender::Customer)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let metadata = ConversationMetadata {
            intent: normalize_label(&payload.intent),
            sentiment: normalize_label(&payload.sentiment),
            emotions: payload
                .emotions
                .iter()
                .map(|emotion| normalize_label(emotion))
                .filter(|emotion| !emotion.is_empty())
                .collect(),
            objections: validate_objections(&payload.objections, &customer_text),
            updated_at: Some(Utc::now()),
        };

        self.conversations
            .save_conversation_metadata(tenant_id, conversation_id, &metadata)
            .await?;
        info!(
            event_name = "analysis.saved",
            tenant_id = %tenant_id.0,
            conversation_id = %conversation_id.0,
            intent = %metadata.intent,
            sentiment = %metadata.sentiment,
            objection_count = metadata.objections.len(),
            "conversation metadata updated"
        );

        Ok(Some(metadata))
    }
}

fn parse_analysis(raw: &str) -> Option<AnalysisPayload> {
    match parse_json_payload(raw)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
