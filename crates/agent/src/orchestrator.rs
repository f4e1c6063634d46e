//! Agent-assist pipeline: cache check, context retrieval, generation,
//! per-candidate validation and scoring, cache store.
//!
//! Model and retrieval failures degrade to empty context or an empty
//! suggestion list. Only storage failures reach the caller.

use std::sync::Arc;

use chrono::Utc;
use parley_core::config::AssistConfig;
use parley_core::domain::conversation::{
    latest_customer_message, ConversationId, ConversationMetadata, CustomerMemory, Message,
};
use parley_core::domain::rule::Rule;
use parley_core::domain::TenantId;
use parley_core::errors::ApplicationError;
use parley_core::policy::{DeterministicPolicyEngine, PolicyEngine};
use parley_core::store::{ConversationStore, KnowledgeRetriever, RuleStore, SuggestionCacheStore};
use parley_core::suggestions::{
    parse_candidates, ConfidenceInputs, ConfidenceScorer, ModelCandidate, ParsedCandidates,
    Suggestion, SuggestionCacheEntry, SuggestionCacheKey, SuggestionResponse,
    DEFAULT_CONTEXT_TOP_K, FALLBACK_CANDIDATE_CONFIDENCE,
};
use tracing::{debug, info, warn};

use crate::llm::{ModelClient, ModelError};
use crate::prompts::{suggestion_prompt, translation_prompt, SuggestionPromptInput};

#[derive(Clone, Debug, PartialEq)]
pub struct AssistSettings {
    pub agent_language: String,
    pub context_top_k: usize,
    /// Confidence given to raw text when model output is not a JSON array.
    pub fallback_confidence: f64,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            agent_language: "en".to_string(),
            context_top_k: DEFAULT_CONTEXT_TOP_K,
            fallback_confidence: FALLBACK_CANDIDATE_CONFIDENCE,
        }
    }
}

impl From<&AssistConfig> for AssistSettings {
    fn from(config: &AssistConfig) -> Self {
        Self {
            agent_language: config.agent_language.clone(),
            context_top_k: config.context_top_k,
            fallback_confidence: config.fallback_confidence,
        }
    }
}

/// Collaborators the pipeline reads from and writes to.
#[derive(Clone)]
pub struct AssistCapabilities {
    pub conversations: Arc<dyn ConversationStore>,
    pub rules: Arc<dyn RuleStore>,
    pub cache: Arc<dyn SuggestionCacheStore>,
    pub retriever: Arc<dyn KnowledgeRetriever>,
    pub model: Arc<dyn ModelClient>,
}

#[derive(Debug, Default)]
struct RetrievedContext {
    text: String,
    scores: Vec<f64>,
}

impl RetrievedContext {
    fn is_used(&self) -> bool {
        !self.text.is_empty()
    }
}

struct GenerationRequest<'a> {
    messages: &'a [Message],
    latest: &'a Message,
    customer_language: &'a str,
    brand_tone: &'a str,
    memory: Option<&'a CustomerMemory>,
    context: &'a str,
}

pub struct SuggestionOrchestrator {
    conversations: Arc<dyn ConversationStore>,
    rules: Arc<dyn RuleStore>,
    cache: Arc<dyn SuggestionCacheStore>,
    retriever: Arc<dyn KnowledgeRetriever>,
    model: Arc<dyn ModelClient>,
    policy: Arc<dyn PolicyEngine>,
    scorer: ConfidenceScorer,
    settings: AssistSettings,
}

impl SuggestionOrchestrator {
    pub fn new(capabilities: AssistCapabilities, settings: AssistSettings) -> Self {
        Self {
            conversations: capabilities.conversations,
            rules: capabilities.rules,
            cache: capabilities.cache,
            retriever: capabilities.retriever,
            model: capabilities.model,
            policy: Arc::new(DeterministicPolicyEngine::new()),
            scorer: ConfidenceScorer::new(),
            settings,
        }
    }

    pub fn with_policy_engine(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn settings(&self) -> &AssistSettings {
        &self.settings
    }

    /// Suggestions for the conversation's current state.
    ///
    /// Keyed by the newest customer message; a repeated request for the same
    /// key is served from cache with freshly read metadata.
    pub async fn get_suggestions(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<SuggestionResponse, ApplicationError> {
        let messages = self.conversations.get_messages(tenant_id, conversation_id).await?;
        let metadata =
            self.conversations.get_conversation_metadata(tenant_id, conversation_id).await?;

        let Some(latest) = latest_customer_message(&messages) else {
            debug!(
                event_name = "assist.no_customer_message",
                tenant_id = %tenant_id.0,
                conversation_id = %conversation_id.0,
                "no customer message to reply to"
            );
            return Ok(SuggestionResponse::empty(metadata));
        };

        let key = SuggestionCacheKey {
            conversation_id: conversation_id.clone(),
            last_message_id: latest.id.clone(),
        };
        if let Some(entry) = self.cache.get_suggestion_cache(tenant_id, &key).await? {
            info!(
                event_name = "assist.cache.hit",
                tenant_id = %tenant_id.0,
                conversation_id = %conversation_id.0,
                last_message_id = %key.last_message_id.0,
                "serving cached suggestions"
            );
            return Ok(SuggestionResponse {
                suggestions: entry.suggestions,
                context_used: entry.context_used,
                metadata,
            });
        }

        let context = self.retrieve_context(tenant_id, &latest.content).await;

        let customer =
            self.conversations.get_conversation_customer(tenant_id, conversation_id).await?;
        let memory = match customer {
            Some(customer_id) => {
                self.conversations.get_customer_memory(tenant_id, &customer_id).await?
            }
            None => None,
        };
        let brand_tone = self.conversations.get_brand_tone(tenant_id).await?;
        let customer_language = latest.language.clone().unwrap_or_default();

        let request = GenerationRequest {
            messages: &messages,
            latest,
            customer_language: &customer_language,
            brand_tone: &brand_tone,
            memory: memory.as_ref(),
            context: &context.text,
        };
        let parsed = match self.generate_candidates(&request).await {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(
                    event_name = "assist.generation.degraded",
                    tenant_id = %tenant_id.0,
                    conversation_id = %conversation_id.0,
                    error_class = error.class_label(),
                    error = %error,
                    "generation failed; returning no suggestions"
                );
                return Ok(SuggestionResponse {
                    suggestions: Vec::new(),
                    context_used: context.is_used(),
                    metadata,
                });
            }
        };

        if parsed.malformed {
            warn!(
                event_name = "assist.output.malformed",
                tenant_id = %tenant_id.0,
                conversation_id = %conversation_id.0,
                "model output was not a JSON array; kept raw text as one suggestion"
            );
        }

        let rules = self.rules.load_active_rules(tenant_id).await?;
        let analysis = metadata.clone().unwrap_or_default();
        let suggestions =
            self.validate_and_score(parsed.candidates, &rules, &analysis, &context.scores);

        let context_used = context.is_used();
        self.cache
            .save_suggestion_cache(SuggestionCacheEntry {
                tenant_id: tenant_id.clone(),
                key,
                suggestions: suggestions.clone(),
                context_used,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            event_name = "assist.suggestions.generated",
            tenant_id = %tenant_id.0,
            conversation_id = %conversation_id.0,
            suggestion_count = suggestions.len(),
            context_used,
            "suggestions generated"
        );

        Ok(SuggestionResponse { suggestions, context_used, metadata })
    }

    async fn retrieve_context(&self, tenant_id: &TenantId, query: &str) -> RetrievedContext {
        let vector = match self.model.generate_embedding(query).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(
                    event_name = "assist.context.degraded",
                    tenant_id = %tenant_id.0,
                    stage = "embedding",
                    error_class = error.class_label(),
                    error = %error,
                    "continuing without knowledge context"
                );
                return RetrievedContext::default();
            }
        };

        let collection = tenant_id.product_collection();
        let chunks =
            match self.retriever.query(&collection, &vector, self.settings.context_top_k).await {
                Ok(chunks) => chunks,
                Err(error) => {
                    warn!(
                        event_name = "assist.context.degraded",
                        tenant_id = %tenant_id.0,
                        stage = "retrieval",
                        collection = %collection,
                        error = %error,
                        "continuing without knowledge context"
                    );
                    return RetrievedContext::default();
                }
            };

        let mut context = RetrievedContext::default();
        for chunk in chunks.into_iter().filter(|chunk| !chunk.text.trim().is_empty()) {
            if !context.text.is_empty() {
                context.text.push_str("\n\n");
            }
            context.text.push_str(chunk.text.trim());
            context.scores.push(chunk.score);
        }
        context
    }

    async fn generate_candidates(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<ParsedCandidates, ModelError> {
        if needs_translation(request.customer_language, &self.settings.agent_language) {
            match self.generate_translated(request).await {
                Ok(parsed) => return Ok(parsed),
                Err(error) => warn!(
                    event_name = "assist.translation.fallback",
                    customer_language = request.customer_language,
                    agent_language = %self.settings.agent_language,
                    error_class = error.class_label(),
                    "translation round trip failed; generating directly"
                ),
            }
        }

        let prompt = suggestion_prompt(&SuggestionPromptInput {
            transcript: request.messages,
            customer_message: &request.latest.content,
            reply_language: request.customer_language,
            brand_tone: request.brand_tone,
            memory: request.memory,
        });
        let raw = self.model.generate_text(&prompt, request.context).await?;
        Ok(parse_candidates(&raw, self.settings.fallback_confidence))
    }

    /// Translate the customer message into the agent language, generate
    /// there, then translate each candidate back.
    async fn generate_translated(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<ParsedCandidates, ModelError> {
        let agent_language = self.settings.agent_language.as_str();
        let translated_message =
            self.translate(&request.latest.content, agent_language).await?;

        let prompt = suggestion_prompt(&SuggestionPromptInput {
            transcript: request.messages,
            customer_message: &translated_message,
            reply_language: agent_language,
            brand_tone: request.brand_tone,
            memory: request.memory,
        });
        let raw = self.model.generate_text(&prompt, request.context).await?;
        let parsed = parse_candidates(&raw, self.settings.fallback_confidence);

        let mut candidates = Vec::with_capacity(parsed.candidates.len());
        for candidate in parsed.candidates {
            let text = self.translate(&candidate.text, request.customer_language).await?;
            candidates.push(ModelCandidate { text, ..candidate });
        }

        Ok(ParsedCandidates { candidates, malformed: parsed.malformed })
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ModelError> {
        let translated =
            self.model.generate_text(&translation_prompt(text, target_language), "").await?;
        let translated = translated.trim();
        if translated.is_empty() {
            return Err(ModelError::Decode("empty translation".to_string()));
        }
        Ok(translated.to_string())
    }

    fn validate_and_score(
        &self,
        candidates: Vec<ModelCandidate>,
        rules: &[Rule],
        analysis: &ConversationMetadata,
        context_scores: &[f64],
    ) -> Vec<Suggestion> {
        candidates
            .into_iter()
            .filter_map(|candidate| {
                let validation = self.policy.validate_output(&candidate.text, rules);
                if validation.blocked {
                    debug!(
                        event_name = "assist.candidate.blocked",
                        explanation = %validation.explanation,
                        "dropping blocked candidate"
                    );
                    return None;
                }

                let text = validation.corrected_text.trim().to_string();
                if text.is_empty() {
                    return None;
                }

                let inputs = ConfidenceInputs {
                    analysis: analysis.clone(),
                    context_scores: context_scores.to_vec(),
                    rule_results: validation.rule_pass_vector(),
                    self_evaluation: candidate
                        .confidence
                        .unwrap_or(self.settings.fallback_confidence),
                };
                let confidence = round_confidence(self.scorer.calculate_confidence(&inputs));

                Some(Suggestion {
                    text,
                    confidence,
                    product_match: !candidate.product_recommendations.is_empty(),
                    product_recommendations: candidate.product_recommendations,
                    reasoning: candidate.reasoning,
                })
            })
            .collect()
    }
}

/// Primary language subtags differ ("pt-BR" and "pt" match). Unknown never translates.
fn needs_translation(customer_language: &str, agent_language: &str) -> bool {
    let customer = primary_subtag(customer_language);
    !customer.is_empty() && customer != primary_subtag(agent_language)
}

fn primary_subtag(language: &str) -> String {
    language.trim().split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase()
}

/// Four decimals keep cached payloads stable through JSON round trips.
fn round_confidence(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
