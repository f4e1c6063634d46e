mod common;

use async_trait::async_trait;
use common::{is_translation, Harness, ScriptedModel};
use parley_agent::ModelError;
use parley_core::domain::conversation::{
    ConversationId, ConversationMetadata, CustomerId, CustomerMemory, Message, NewMessage, Sender,
};
use parley_core::domain::rule::{Rule, RuleAction, RuleId};
use parley_core::domain::TenantId;
use parley_core::errors::{ApplicationError, StoreError};
use parley_core::store::ConversationStore;
use parley_db::repositories::KnowledgeDocument;
use serde_json::json;
use std::sync::Arc;

const TWO_REPLIES: &str = r#"[
    {"text": "Our Hydra Serum is made for dry skin.", "confidence": 0.9,
     "reasoning": "direct product answer", "product_recommendations": ["Hydra Serum"]},
    {"text": "Happy to help! What is your skin type?", "confidence": 0.6}
]"#;

fn rule(id: &str, pattern: &str, action: RuleAction, template: Option<&str>) -> Rule {
    Rule {
        id: RuleId(id.to_string()),
        tenant_id: TenantId("acme".to_string()),
        name: format!("rule {id}"),
        pattern: pattern.to_string(),
        action,
        correction_template: template.map(str::to_string),
        description: None,
        active: true,
    }
}

#[tokio::test]
async fn repeated_request_is_served_from_cache_byte_for_byte() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    harness.say(Sender::Customer, "Do you have a serum for dry skin?", Some("en")).await;
    let orchestrator = harness.orchestrator();

    let first = orchestrator
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("first request");
    let second = orchestrator
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("second request");

    assert_eq!(first.suggestions.len(), 2);
    assert_eq!(
        serde_json::to_string(&first.suggestions).expect("serialize"),
        serde_json::to_string(&second.suggestions).expect("serialize"),
    );
    assert_eq!(harness.model.text_calls(), 1);
    assert_eq!(harness.cache.len().await, 1);
}

#[tokio::test]
async fn agent_messages_do_not_change_the_cache_key() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    harness.say(Sender::Customer, "Is shipping free?", Some("en")).await;
    let orchestrator = harness.orchestrator();

    orchestrator.get_suggestions(&harness.tenant, &harness.conversation).await.expect("first");
    harness.say(Sender::Agent, "Let me check that for you.", Some("en")).await;
    orchestrator.get_suggestions(&harness.tenant, &harness.conversation).await.expect("second");
    assert_eq!(harness.model.text_calls(), 1);

    harness.say(Sender::Customer, "Any update?", Some("en")).await;
    orchestrator.get_suggestions(&harness.tenant, &harness.conversation).await.expect("third");
    assert_eq!(harness.model.text_calls(), 2);
    assert_eq!(harness.cache.len().await, 2);
}

#[tokio::test]
async fn cached_response_carries_current_metadata() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    harness.say(Sender::Customer, "How much is the serum?", Some("en")).await;
    let orchestrator = harness.orchestrator();

    let first = orchestrator
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("first request");
    assert!(first.metadata.is_none());

    let metadata = ConversationMetadata {
        intent: "buying".to_string(),
        sentiment: "neutral".to_string(),
        emotions: Vec::new(),
        objections: vec!["price".to_string()],
        updated_at: None,
    };
    harness
        .conversations
        .save_conversation_metadata(&harness.tenant, &harness.conversation, &metadata)
        .await
        .expect("save metadata");

    let second = orchestrator
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("second request");
    assert_eq!(second.metadata, Some(metadata));
    assert_eq!(second.suggestions, first.suggestions);
}

#[tokio::test]
async fn discount_promise_is_corrected_and_guarantee_is_dropped() {
    let harness = Harness::new(ScriptedModel::replying(
        r#"[
            {"text": "Great news, you get 50% off today!", "confidence": 0.9,
             "product_recommendations": ["Hydra Serum"]},
            {"text": "Results are guaranteed or your money back.", "confidence": 0.95}
        ]"#,
    ));
    harness
        .rules
        .save_rule(rule("discount", r"\d+% off", RuleAction::AutoCorrect, Some("a special offer")))
        .await;
    harness.rules.save_rule(rule("guarantee", "guaranteed", RuleAction::Block, None)).await;
    harness.say(Sender::Customer, "Any discounts right now?", Some("en")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert_eq!(response.suggestions.len(), 1);
    let suggestion = &response.suggestions[0];
    assert_eq!(suggestion.text, "Great news, you get a special offer today!");
    assert!(suggestion.product_match);
    assert!(suggestion.confidence > 0.0 && suggestion.confidence <= 1.0);
}

#[tokio::test]
async fn conversation_without_customer_message_gets_nothing() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    harness.say(Sender::Agent, "Hi! How can I help?", Some("en")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert!(response.suggestions.is_empty());
    assert!(!response.context_used);
    assert_eq!(harness.model.text_calls(), 0);
}

#[tokio::test]
async fn model_outage_degrades_to_empty_uncached_response() {
    let harness = Harness::new(
        ScriptedModel::new(|_| Err(ModelError::Api { status: 503, body: "overloaded".to_string() }))
            .with_embedding(Err(ModelError::Timeout)),
    );
    harness.say(Sender::Customer, "Hello?", Some("en")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("degraded response is still Ok");

    assert!(response.suggestions.is_empty());
    assert!(!response.context_used);
    assert!(harness.cache.is_empty().await);
}

#[tokio::test]
async fn retrieved_knowledge_marks_context_used() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    harness
        .retriever
        .add_document(
            harness.tenant.product_collection(),
            KnowledgeDocument {
                text: "Hydra Serum: hyaluronic acid serum for dry skin, 30ml.".to_string(),
                vector: vec![1.0, 0.0],
                metadata: json!({ "sku": "HS-30" }),
            },
        )
        .await;
    harness.say(Sender::Customer, "What helps with dry skin?", Some("en")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert!(response.context_used);
    assert_eq!(response.suggestions.len(), 2);
}

#[tokio::test]
async fn missing_collection_still_generates_without_context() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    harness.say(Sender::Customer, "What helps with dry skin?", Some("en")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert!(!response.context_used);
    assert_eq!(response.suggestions.len(), 2);
}

#[tokio::test]
async fn prose_output_becomes_a_single_suggestion() {
    let harness = Harness::new(ScriptedModel::replying("Sure, happy to help with that!"));
    harness.say(Sender::Customer, "Can you help me?", Some("en")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert_eq!(response.suggestions.len(), 1);
    assert_eq!(response.suggestions[0].text, "Sure, happy to help with that!");
}

#[tokio::test]
async fn foreign_language_round_trips_through_agent_language() {
    let harness = Harness::new(ScriptedModel::new(|prompt| {
        if is_translation(prompt) && prompt.contains("into language `en`") {
            Ok("Do you ship to Spain?".to_string())
        } else if is_translation(prompt) {
            Ok("Sí, enviamos a España.".to_string())
        } else {
            Ok(r#"[{"text": "Yes, we ship to Spain.", "confidence": 0.8}]"#.to_string())
        }
    }));
    harness.say(Sender::Customer, "¿Envían a España?", Some("es")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert_eq!(response.suggestions.len(), 1);
    assert_eq!(response.suggestions[0].text, "Sí, enviamos a España.");
    assert!(harness
        .model
        .prompts()
        .iter()
        .any(|prompt| prompt.contains("Latest customer message:\nDo you ship to Spain?")));
    assert_eq!(harness.model.text_calls(), 3);
}

#[tokio::test]
async fn failed_translation_falls_back_to_direct_generation() {
    let harness = Harness::new(ScriptedModel::new(|prompt| {
        if is_translation(prompt) {
            Err(ModelError::Timeout)
        } else {
            Ok(r#"[{"text": "Sí, enviamos a toda Europa.", "confidence": 0.7}]"#.to_string())
        }
    }));
    harness.say(Sender::Customer, "¿Envían a España?", Some("es")).await;

    let response = harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    assert_eq!(response.suggestions.len(), 1);
    assert_eq!(response.suggestions[0].text, "Sí, enviamos a toda Europa.");
    assert!(harness
        .model
        .prompts()
        .iter()
        .any(|prompt| prompt.contains("Write every reply in language `es`.")));
}

#[tokio::test]
async fn customer_memory_and_brand_tone_reach_the_prompt() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    let customer = CustomerId("cust-42".to_string());
    harness
        .conversations
        .set_conversation_customer(&harness.tenant, &harness.conversation, customer.clone())
        .await;
    harness
        .conversations
        .save_customer_memory(
            &harness.tenant,
            &customer,
            CustomerMemory {
                pricing_sensitivity: Some("high".to_string()),
                interests: vec!["vegan skincare".to_string()],
                past_objections: Vec::new(),
            },
        )
        .await;
    harness.conversations.set_brand_tone(&harness.tenant, "Warm and playful").await;
    harness.say(Sender::Customer, "What do you recommend?", Some("en")).await;

    harness
        .orchestrator()
        .get_suggestions(&harness.tenant, &harness.conversation)
        .await
        .expect("suggestions");

    let prompts = harness.model.prompts();
    let prompt = prompts.first().expect("one suggestion prompt");
    assert!(prompt.contains("Brand tone: Warm and playful"));
    assert!(prompt.contains("- pricing sensitivity: high"));
    assert!(prompt.contains("- interests: vegan skincare"));
}

struct UnavailableConversations;

#[async_trait]
impl ConversationStore for UnavailableConversations {
    async fn get_messages(
        &self,
        _tenant_id: &TenantId,
        _conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unavailable("database is locked".to_string()))
    }

    async fn append_message(
        &self,
        _tenant_id: &TenantId,
        _conversation_id: &ConversationId,
        _message: NewMessage,
    ) -> Result<Message, StoreError> {
        Err(StoreError::Unavailable("database is locked".to_string()))
    }

    async fn get_conversation_metadata(
        &self,
        _tenant_id: &TenantId,
        _conversation_id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError> {
        Ok(None)
    }

    async fn save_conversation_metadata(
        &self,
        _tenant_id: &TenantId,
        _conversation_id: &ConversationId,
        _metadata: &ConversationMetadata,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_conversation_customer(
        &self,
        _tenant_id: &TenantId,
        _conversation_id: &ConversationId,
    ) -> Result<Option<CustomerId>, StoreError> {
        Ok(None)
    }

    async fn get_customer_memory(
        &self,
        _tenant_id: &TenantId,
        _customer_id: &CustomerId,
    ) -> Result<Option<CustomerMemory>, StoreError> {
        Ok(None)
    }

    async fn get_brand_tone(&self, _tenant_id: &TenantId) -> Result<String, StoreError> {
        Ok(String::new())
    }
}

#[tokio::test]
async fn storage_failure_reaches_the_caller() {
    let harness = Harness::new(ScriptedModel::replying(TWO_REPLIES));
    let mut capabilities = harness.capabilities();
    capabilities.conversations = Arc::new(UnavailableConversations);
    let orchestrator =
        parley_agent::SuggestionOrchestrator::new(capabilities, Default::default());

    let result = orchestrator.get_suggestions(&harness.tenant, &harness.conversation).await;

    assert!(matches!(result, Err(ApplicationError::Persistence(_))));
    assert_eq!(harness.model.text_calls(), 0);
}
