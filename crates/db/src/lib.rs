pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, ping, DbPool};
pub use repositories::{
    InMemoryAutoReplyConfigStore, InMemoryConversationStore, InMemoryKnowledgeRetriever,
    InMemoryRuleStore, InMemorySuggestionCache, RepositoryError, SqlAutoReplyConfigRepository,
    SqlConversationRepository, SqlRuleRepository, SqlSuggestionCacheRepository,
};
