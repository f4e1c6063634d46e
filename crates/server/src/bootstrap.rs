use std::sync::Arc;
use std::time::Duration;

use parley_agent::runtime::TriggerPoolSettings;
use parley_agent::{
    trigger_queue, AssistCapabilities, AssistJobHandler, AssistSettings,
    AutoReplyDecisionService, ConversationAnalyzer, DisabledModelClient, HttpModelClient,
    Ingestion, ModelClient, RetryPolicy, RetryingModelClient, ShutdownOutcome,
    SuggestionOrchestrator, TriggerPool,
};
use parley_core::config::{AppConfig, ConfigError, ModelConfig};
use parley_db::{
    connect_from_config, migrations, DbPool, InMemoryKnowledgeRetriever,
    SqlAutoReplyConfigRepository, SqlConversationRepository, SqlRuleRepository,
    SqlSuggestionCacheRepository,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub model: Arc<dyn ModelClient>,
    pub state: AppState,
    pub triggers: TriggerPool,
    pub drain_timeout: Duration,
}

impl Application {
    /// Stops background intake and drains queued jobs.
    pub async fn shutdown(self) -> ShutdownOutcome {
        let outcome = self.triggers.shutdown(self.drain_timeout).await;
        self.db_pool.close().await;
        outcome
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(
    options: parley_core::config::LoadOptions,
) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let model: Arc<dyn ModelClient> = if config.model_available() {
        build_model_client(&config.model)
    } else {
        warn!(
            event_name = "system.bootstrap.model_disabled",
            "no model api key configured; suggestions will degrade to empty results"
        );
        Arc::new(DisabledModelClient)
    };
    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));

    let orchestrator = Arc::new(SuggestionOrchestrator::new(
        AssistCapabilities {
            conversations: conversations.clone(),
            rules: Arc::new(SqlRuleRepository::new(db_pool.clone())),
            cache: Arc::new(SqlSuggestionCacheRepository::new(db_pool.clone())),
            retriever: Arc::new(InMemoryKnowledgeRetriever::default()),
            model: model.clone(),
        },
        AssistSettings::from(&config.assist),
    ));

    let pool_settings = TriggerPoolSettings::from(&config.workers);
    let (trigger_handle, trigger_queue) = trigger_queue(pool_settings.queue_capacity);
    let ingestion = Arc::new(Ingestion::new(conversations.clone(), trigger_handle));

    let auto_reply = Arc::new(AutoReplyDecisionService::new(
        Arc::new(SqlAutoReplyConfigRepository::new(db_pool.clone())),
        conversations.clone(),
        orchestrator.clone(),
        ingestion.clone(),
        config.auto_reply.default_threshold,
    ));
    let analyzer = Arc::new(ConversationAnalyzer::new(conversations, model.clone()));
    let triggers = TriggerPool::start(
        trigger_queue,
        Arc::new(AssistJobHandler::new(analyzer, auto_reply)),
        pool_settings.worker_count,
    );

    Ok(Application {
        state: AppState { orchestrator, ingestion },
        drain_timeout: pool_settings.drain_timeout,
        config,
        db_pool,
        model,
        triggers,
    })
}

fn build_model_client(config: &ModelConfig) -> Arc<dyn ModelClient> {
    match HttpModelClient::new(config) {
        Ok(client) => {
            info!(
                event_name = "system.bootstrap.model_ready",
                model = %config.model,
                max_retries = config.max_retries,
                "model client configured"
            );
            Arc::new(RetryingModelClient::new(client, RetryPolicy::from(config)))
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.model_disabled",
                error = %error,
                "model client unavailable; suggestions will degrade to empty results"
            );
            Arc::new(DisabledModelClient)
        }
    }
}
