//! Agent assist - everything that talks to the untrusted generative model
//!
//! This crate turns conversations into agent-facing reply suggestions and,
//! when a tenant allows it, autonomous replies:
//! - Calls the external model with classified retry and backoff (`retry`, `model_client`)
//! - Builds prompts from transcript, customer memory and brand tone (`prompts`)
//! - Runs the suggestion pipeline with caching and graceful degradation (`orchestrator`)
//! - Keeps the conversation analysis snapshot current (`analysis`)
//! - Decides and sends auto-replies (`guardrails`, `auto_reply`)
//! - Schedules background work on a bounded worker pool (`runtime`)
//!
//! # Safety Principle
//!
//! The model is strictly a text generator. Every suggestion passes through the
//! deterministic policy engine and gets its confidence from the scorer, never
//! from the model alone.

pub mod analysis;
pub mod auto_reply;
pub mod guardrails;
pub mod llm;
pub mod model_client;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod runtime;

pub use analysis::ConversationAnalyzer;
pub use auto_reply::{AutoReplyDecisionService, AutoReplyOutcome};
pub use guardrails::{AutoReplyDecision, AutoReplyGuard};
pub use llm::{DisabledModelClient, ModelClient, ModelError};
pub use model_client::HttpModelClient;
pub use orchestrator::{AssistCapabilities, AssistSettings, SuggestionOrchestrator};
pub use retry::{ErrorClass, RetryPolicy, RetryingModelClient};
pub use runtime::{
    trigger_queue, AssistJobHandler, Ingestion, ShutdownOutcome, TriggerError, TriggerHandle,
    TriggerJob, TriggerPool, TriggerPoolSettings,
};
