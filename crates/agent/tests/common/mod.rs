#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_agent::{
    AssistCapabilities, AssistSettings, ModelClient, ModelError, SuggestionOrchestrator,
};
use parley_core::domain::conversation::{ConversationId, Message, NewMessage, Sender};
use parley_core::domain::TenantId;
use parley_core::store::ConversationStore;
use parley_db::{
    InMemoryConversationStore, InMemoryKnowledgeRetriever, InMemoryRuleStore,
    InMemorySuggestionCache,
};

type Responder = dyn Fn(&str) -> Result<String, ModelError> + Send + Sync;

/// Model double that answers each prompt through a closure and records traffic.
pub struct ScriptedModel {
    respond: Box<Responder>,
    embedding: Result<Vec<f32>, ModelError>,
    prompts: Mutex<Vec<String>>,
    text_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(respond: impl Fn(&str) -> Result<String, ModelError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            embedding: Ok(vec![1.0, 0.0]),
            prompts: Mutex::new(Vec::new()),
            text_calls: AtomicUsize::new(0),
        }
    }

    /// Suggestion prompts get `suggestions`; analysis prompts get a neutral snapshot.
    pub fn replying(suggestions: &'static str) -> Self {
        Self::new(move |prompt| {
            if is_analysis(prompt) {
                Ok(r#"{"intent": "buying", "sentiment": "positive", "emotions": [], "objections": []}"#
                    .to_string())
            } else {
                Ok(suggestions.to_string())
            }
        })
    }

    pub fn with_embedding(mut self, embedding: Result<Vec<f32>, ModelError>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }
}

pub fn is_analysis(prompt: &str) -> bool {
    prompt.starts_with("Analyse this customer conversation")
}

pub fn is_translation(prompt: &str) -> bool {
    prompt.starts_with("Translate the following text")
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate_text(&self, prompt: &str, _context: &str) -> Result<String, ModelError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.respond)(prompt)
    }

    async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
        self.embedding.clone()
    }

    async fn health_check(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

pub struct Harness {
    pub tenant: TenantId,
    pub conversation: ConversationId,
    pub conversations: Arc<InMemoryConversationStore>,
    pub rules: Arc<InMemoryRuleStore>,
    pub cache: Arc<InMemorySuggestionCache>,
    pub retriever: Arc<InMemoryKnowledgeRetriever>,
    pub model: Arc<ScriptedModel>,
}

impl Harness {
    pub fn new(model: ScriptedModel) -> Self {
        Self {
            tenant: TenantId("acme".to_string()),
            conversation: ConversationId("conv-1".to_string()),
            conversations: Arc::new(InMemoryConversationStore::default()),
            rules: Arc::new(InMemoryRuleStore::default()),
            cache: Arc::new(InMemorySuggestionCache::default()),
            retriever: Arc::new(InMemoryKnowledgeRetriever::default()),
            model: Arc::new(model),
        }
    }

    pub fn capabilities(&self) -> AssistCapabilities {
        AssistCapabilities {
            conversations: self.conversations.clone(),
            rules: self.rules.clone(),
            cache: self.cache.clone(),
            retriever: self.retriever.clone(),
            model: self.model.clone(),
        }
    }

    pub fn orchestrator(&self) -> SuggestionOrchestrator {
        SuggestionOrchestrator::new(self.capabilities(), AssistSettings::default())
    }

    pub async fn say(&self, sender: Sender, content: &str, language: Option<&str>) -> Message {
        self.conversations
            .append_message(
                &self.tenant,
                &self.conversation,
                NewMessage {
                    sender,
                    content: content.to_string(),
                    language: language.map(str::to_string),
                    auto_generated: false,
                },
            )
            .await
            .expect("append message")
    }
}
