pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod store;
pub mod suggestions;

pub use domain::auto_reply::{AutoReplyConfigRow, ConfigSource, EffectiveAutoReplyConfig};
pub use domain::conversation::{
    ConversationId, ConversationMetadata, CustomerId, CustomerMemory, Message, MessageId,
    NewMessage, Sender,
};
pub use domain::rule::{Rule, RuleAction, RuleId, Severity, ValidationResult, Violation};
pub use domain::TenantId;
pub use errors::{ApplicationError, DomainError, InterfaceError, RetrievalError, StoreError};
pub use policy::{validate_objections, DeterministicPolicyEngine, PolicyEngine};
pub use suggestions::{
    ConfidenceInputs, ConfidenceScorer, Suggestion, SuggestionCacheEntry, SuggestionCacheKey,
    SuggestionResponse,
};
