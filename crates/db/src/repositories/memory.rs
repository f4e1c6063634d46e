use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use parley_core::domain::auto_reply::AutoReplyConfigRow;
use parley_core::domain::conversation::{
    ConversationId, ConversationMetadata, CustomerId, CustomerMemory, Message, MessageId,
    NewMessage,
};
use parley_core::domain::rule::Rule;
use parley_core::domain::TenantId;
use parley_core::errors::{RetrievalError, StoreError};
use parley_core::store::{
    AutoReplyConfigStore, ConversationStore, KnowledgeRetriever, RetrievedChunk, RuleStore,
    SuggestionCacheStore,
};
use parley_core::suggestions::{SuggestionCacheEntry, SuggestionCacheKey};

type ConversationKey = (String, String);

fn conversation_key(tenant_id: &TenantId, conversation_id: &ConversationId) -> ConversationKey {
    (tenant_id.0.clone(), conversation_id.0.clone())
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl InMemoryRuleStore {
    /// Inserts or replaces a rule by id.
    pub async fn save_rule(&self, rule: Rule) {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }
}

#[async_trait::async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn load_active_rules(&self, tenant_id: &TenantId) -> Result<Vec<Rule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|rule| rule.active && &rule.tenant_id == tenant_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    messages: RwLock<HashMap<ConversationKey, Vec<Message>>>,
    metadata: RwLock<HashMap<ConversationKey, ConversationMetadata>>,
    customers: RwLock<HashMap<ConversationKey, CustomerId>>,
    memories: RwLock<HashMap<(String, String), CustomerMemory>>,
    brand_tones: RwLock<HashMap<String, String>>,
}

impl InMemoryConversationStore {
    pub async fn set_conversation_customer(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        customer_id: CustomerId,
    ) {
        let mut customers = self.customers.write().await;
        customers.insert(conversation_key(tenant_id, conversation_id), customer_id);
    }

    pub async fn save_customer_memory(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        memory: CustomerMemory,
    ) {
        let mut memories = self.memories.write().await;
        memories.insert((tenant_id.0.clone(), customer_id.0.clone()), memory);
    }

    pub async fn set_brand_tone(&self, tenant_id: &TenantId, brand_tone: impl Into<String>) {
        let mut tones = self.brand_tones.write().await;
        tones.insert(tenant_id.0.clone(), brand_tone.into());
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&conversation_key(tenant_id, conversation_id)).cloned().unwrap_or_default())
    }

    async fn append_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let stored = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            tenant_id: tenant_id.clone(),
            conversation_id: conversation_id.clone(),
            sender: message.sender,
            content: message.content,
            language: message.language,
            auto_generated: message.auto_generated,
            created_at: Utc::now(),
        };

        let mut messages = self.messages.write().await;
        messages
            .entry(conversation_key(tenant_id, conversation_id))
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get_conversation_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError> {
        let metadata = self.metadata.read().await;
        Ok(metadata.get(&conversation_key(tenant_id, conversation_id)).cloned())
    }

    async fn save_conversation_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        metadata: &ConversationMetadata,
    ) -> Result<(), StoreError> {
        let mut stored = self.metadata.write().await;
        stored.insert(conversation_key(tenant_id, conversation_id), metadata.clone());
        Ok(())
    }

    async fn get_conversation_customer(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<CustomerId>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&conversation_key(tenant_id, conversation_id)).cloned())
    }

    async fn get_customer_memory(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerMemory>, StoreError> {
        let memories = self.memories.read().await;
        Ok(memories.get(&(tenant_id.0.clone(), customer_id.0.clone())).cloned())
    }

    async fn get_brand_tone(&self, tenant_id: &TenantId) -> Result<String, StoreError> {
        let tones = self.brand_tones.read().await;
        Ok(tones.get(&tenant_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemorySuggestionCache {
    entries: RwLock<HashMap<(String, SuggestionCacheKey), SuggestionCacheEntry>>,
}

impl InMemorySuggestionCache {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SuggestionCacheStore for InMemorySuggestionCache {
    async fn get_suggestion_cache(
        &self,
        tenant_id: &TenantId,
        key: &SuggestionCacheKey,
    ) -> Result<Option<SuggestionCacheEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(tenant_id.0.clone(), key.clone())).cloned())
    }

    async fn save_suggestion_cache(&self, entry: SuggestionCacheEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert((entry.tenant_id.0.clone(), entry.key.clone()), entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAutoReplyConfigStore {
    rows: RwLock<HashMap<(String, Option<String>), AutoReplyConfigRow>>,
}

impl InMemoryAutoReplyConfigStore {
    pub async fn save_config(&self, row: AutoReplyConfigRow) {
        let key = (row.tenant_id.0.clone(), row.conversation_id.as_ref().map(|id| id.0.clone()));
        let mut rows = self.rows.write().await;
        rows.insert(key, row);
    }
}

#[async_trait::async_trait]
impl AutoReplyConfigStore for InMemoryAutoReplyConfigStore {
    async fn conversation_auto_reply_config(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<AutoReplyConfigRow>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(tenant_id.0.clone(), Some(conversation_id.0.clone()))).cloned())
    }

    async fn global_auto_reply_config(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<AutoReplyConfigRow>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(tenant_id.0.clone(), None)).cloned())
    }
}

/// One embedded chunk held by [`InMemoryKnowledgeRetriever`].
#[derive(Clone, Debug, PartialEq)]
pub struct KnowledgeDocument {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// Brute-force cosine search over per-collection documents.
#[derive(Default)]
pub struct InMemoryKnowledgeRetriever {
    collections: RwLock<HashMap<String, Vec<KnowledgeDocument>>>,
}

impl InMemoryKnowledgeRetriever {
    pub async fn add_document(&self, collection: impl Into<String>, document: KnowledgeDocument) {
        let mut collections = self.collections.write().await;
        collections.entry(collection.into()).or_default().push(document);
    }
}

#[async_trait::async_trait]
impl KnowledgeRetriever for InMemoryKnowledgeRetriever {
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let collections = self.collections.read().await;
        let documents = collections
            .get(collection)
            .ok_or_else(|| RetrievalError::UnknownCollection(collection.to_string()))?;

        let mut chunks: Vec<RetrievedChunk> = documents
            .iter()
            .map(|document| RetrievedChunk {
                text: document.text.clone(),
                score: cosine_similarity(vector, &document.vector).clamp(0.0, 1.0),
                metadata: document.metadata.clone(),
            })
            .collect();
        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        chunks.truncate(top_k);
        Ok(chunks)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}
