use std::sync::Arc;

use parley_core::domain::auto_reply::EffectiveAutoReplyConfig;
use parley_core::domain::conversation::{ConversationId, MessageId, NewMessage, Sender};
use parley_core::domain::TenantId;
use parley_core::errors::ApplicationError;
use parley_core::store::{AutoReplyConfigStore, ConversationStore, MessageSink};
use tracing::{debug, info};

use crate::guardrails::{AutoReplyDecision, AutoReplyGuard};
use crate::orchestrator::SuggestionOrchestrator;

#[derive(Clone, Debug, PartialEq)]
pub enum AutoReplyOutcome {
    Sent { message_id: MessageId, confidence: f64 },
    Skipped { reason_code: &'static str },
}

/// Autonomously answers a customer with the best qualifying suggestion.
pub struct AutoReplyDecisionService {
    configs: Arc<dyn AutoReplyConfigStore>,
    conversations: Arc<dyn ConversationStore>,
    orchestrator: Arc<SuggestionOrchestrator>,
    sink: Arc<dyn MessageSink>,
    guard: AutoReplyGuard,
    default_threshold: f64,
}

impl AutoReplyDecisionService {
    /// `sink` must be the same ingestion path human agents use.
    pub fn new(
        configs: Arc<dyn AutoReplyConfigStore>,
        conversations: Arc<dyn ConversationStore>,
        orchestrator: Arc<SuggestionOrchestrator>,
        sink: Arc<dyn MessageSink>,
        default_threshold: f64,
    ) -> Self {
        Self {
            configs,
            conversations,
            orchestrator,
            sink,
            guard: AutoReplyGuard::new(),
            default_threshold,
        }
    }

    pub async fn resolve_effective_config(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<EffectiveAutoReplyConfig, ApplicationError> {
        Ok(self
            .configs
            .effective_auto_reply_config(tenant_id, conversation_id, self.default_threshold)
            .await?)
    }

    pub async fn process_auto_reply(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<AutoReplyOutcome, ApplicationError> {
        let config = self.resolve_effective_config(tenant_id, conversation_id).await?;
        let messages = self.conversations.get_messages(tenant_id, conversation_id).await?;

        if let Some(reason_code) = self.guard.precheck(&config, &messages) {
            return Ok(skipped(tenant_id, conversation_id, reason_code));
        }

        let response = self.orchestrator.get_suggestions(tenant_id, conversation_id).await?;
        let suggestion = match self.guard.evaluate(&config, &messages, &response) {
            AutoReplyDecision::Send { suggestion } => suggestion,
            AutoReplyDecision::Skip { reason_code } => {
                return Ok(skipped(tenant_id, conversation_id, reason_code));
            }
        };

        let message = self
            .sink
            .send_message(
                tenant_id,
                conversation_id,
                NewMessage {
                    sender: Sender::Agent,
                    content: suggestion.text,
                    language: None,
                    auto_generated: true,
                },
            )
            .await?;

        info!(
            event_name = "auto_reply.sent",
            tenant_id = %tenant_id.0,
            conversation_id = %conversation_id.0,
            message_id = %message.id.0,
            confidence = suggestion.confidence,
            threshold = config.confidence_threshold,
            config_source = ?config.source,
            "auto-reply sent"
        );

        Ok(AutoReplyOutcome::Sent { message_id: message.id, confidence: suggestion.confidence })
    }
}

fn skipped(
    tenant_id: &TenantId,
    conversation_id: &ConversationId,
    reason_code: &'static str,
) -> AutoReplyOutcome {
    debug!(
        event_name = "auto_reply.skipped",
        tenant_id = %tenant_id.0,
        conversation_id = %conversation_id.0,
        reason_code,
        "auto-reply skipped"
    );
    AutoReplyOutcome::Skipped { reason_code }
}
