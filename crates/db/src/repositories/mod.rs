use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use parley_core::errors::StoreError;

pub mod auto_reply;
pub mod conversation;
pub mod memory;
pub mod rule;
pub mod suggestion_cache;

pub use auto_reply::SqlAutoReplyConfigRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryAutoReplyConfigStore, InMemoryConversationStore, InMemoryKnowledgeRetriever,
    InMemoryRuleStore, InMemorySuggestionCache, KnowledgeDocument,
};
pub use rule::SqlRuleRepository;
pub use suggestion_cache::SqlSuggestionCacheRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

/// Fixed-width UTC timestamps so `ORDER BY` on the text column is chronological.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}
