//! Capability traits for the collaborators the assist pipeline consumes.
//!
//! Every query is scoped by [`TenantId`]; isolation between tenants comes from
//! that scoping, not from locks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::auto_reply::{AutoReplyConfigRow, EffectiveAutoReplyConfig};
use crate::domain::conversation::{
    ConversationId, ConversationMetadata, CustomerId, CustomerMemory, Message, NewMessage,
};
use crate::domain::rule::Rule;
use crate::domain::TenantId;
use crate::errors::{RetrievalError, StoreError};
use crate::suggestions::{SuggestionCacheEntry, SuggestionCacheKey};

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules, read fresh on every call.
    async fn load_active_rules(&self, tenant_id: &TenantId) -> Result<Vec<Rule>, StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Messages ordered by timestamp ascending.
    async fn get_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError>;

    async fn append_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError>;

    async fn get_conversation_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError>;

    async fn save_conversation_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        metadata: &ConversationMetadata,
    ) -> Result<(), StoreError>;

    async fn get_conversation_customer(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<CustomerId>, StoreError>;

    async fn get_customer_memory(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerMemory>, StoreError>;

    /// Free-text brand tone; empty when the tenant has none configured.
    async fn get_brand_tone(&self, tenant_id: &TenantId) -> Result<String, StoreError>;
}

#[async_trait]
pub trait SuggestionCacheStore: Send + Sync {
    async fn get_suggestion_cache(
        &self,
        tenant_id: &TenantId,
        key: &SuggestionCacheKey,
    ) -> Result<Option<SuggestionCacheEntry>, StoreError>;

    /// Replaces any entry under the same key.
    async fn save_suggestion_cache(&self, entry: SuggestionCacheEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AutoReplyConfigStore: Send + Sync {
    async fn conversation_auto_reply_config(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<AutoReplyConfigRow>, StoreError>;

    async fn global_auto_reply_config(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<AutoReplyConfigRow>, StoreError>;

    async fn effective_auto_reply_config(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        default_threshold: f64,
    ) -> Result<EffectiveAutoReplyConfig, StoreError> {
        let conversation = self.conversation_auto_reply_config(tenant_id, conversation_id).await?;
        let global = self.global_auto_reply_config(tenant_id).await?;
        Ok(EffectiveAutoReplyConfig::resolve(
            conversation.as_ref(),
            global.as_ref(),
            default_threshold,
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Similarity to the query vector (0.0 - 1.0)
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// The ingestion write path shared by human agents and auto-reply.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError>;
}
