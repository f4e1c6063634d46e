use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parley_agent::SuggestionOrchestrator;
use parley_core::domain::conversation::{ConversationId, Message, NewMessage, Sender};
use parley_core::domain::TenantId;
use parley_core::errors::{ApplicationError, InterfaceError};
use parley_core::store::MessageSink;
use parley_core::suggestions::SuggestionResponse;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SuggestionOrchestrator>,
    pub ingestion: Arc<dyn MessageSink>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

/// Response wrapper mapping [`InterfaceError`] onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(
            event_name = "http.request.failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "request failed"
        );

        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn application_error(error: ApplicationError) -> ApiError {
    ApiError(error.into_interface(Uuid::new_v4().to_string()))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(InterfaceError::BadRequest {
        message: message.into(),
        correlation_id: Uuid::new_v4().to_string(),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/tenants/{tenant}/conversations/{conversation}/suggestions",
            get(get_suggestions),
        )
        .route("/tenants/{tenant}/conversations/{conversation}/messages", post(post_message))
        .with_state(state)
}

async fn get_suggestions(
    State(state): State<AppState>,
    Path((tenant, conversation)): Path<(String, String)>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let response = state
        .orchestrator
        .get_suggestions(&TenantId(tenant), &ConversationId(conversation))
        .await
        .map_err(application_error)?;
    Ok(Json(response))
}

async fn post_message(
    State(state): State<AppState>,
    Path((tenant, conversation)): Path<(String, String)>,
    Json(body): Json<MessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let sender = Sender::parse(&body.sender)
        .ok_or_else(|| bad_request(format!("unknown sender `{}`", body.sender)))?;
    if body.content.trim().is_empty() {
        return Err(bad_request("message content is required"));
    }

    let language =
        body.language.map(|language| language.trim().to_string()).filter(|l| !l.is_empty());
    let stored = state
        .ingestion
        .send_message(
            &TenantId(tenant),
            &ConversationId(conversation),
            NewMessage { sender, content: body.content, language, auto_generated: false },
        )
        .await
        .map_err(|error| application_error(error.into()))?;

    Ok((StatusCode::CREATED, Json(stored)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use parley_agent::{
        trigger_queue, AssistCapabilities, AssistSettings, Ingestion, ModelClient, ModelError,
        SuggestionOrchestrator, TriggerHandle,
    };
    use parley_core::store::ConversationStore;
    use parley_db::{
        connect_with_settings, migrations, InMemoryConversationStore, InMemoryKnowledgeRetriever,
        InMemoryRuleStore, InMemorySuggestionCache, SqlConversationRepository,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, AppState};

    struct CannedModel;

    #[async_trait]
    impl ModelClient for CannedModel {
        async fn generate_text(&self, _prompt: &str, _context: &str) -> Result<String, ModelError> {
            Ok(r#"[{"text": "Yes, the serum ships today.", "confidence": 0.9}]"#.to_string())
        }

        async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![1.0])
        }

        async fn health_check(&self) -> Result<(), ModelError> {
            Ok(())
        }
    }

    fn app_with(conversations: Arc<dyn ConversationStore>, triggers: TriggerHandle) -> Router {
        let orchestrator = SuggestionOrchestrator::new(
            AssistCapabilities {
                conversations: conversations.clone(),
                rules: Arc::new(InMemoryRuleStore::default()),
                cache: Arc::new(InMemorySuggestionCache::default()),
                retriever: Arc::new(InMemoryKnowledgeRetriever::default()),
                model: Arc::new(CannedModel),
            },
            AssistSettings::default(),
        );
        router(AppState {
            orchestrator: Arc::new(orchestrator),
            ingestion: Arc::new(Ingestion::new(conversations, triggers)),
        })
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn posted_customer_message_gets_suggestions() {
        let (triggers, _queue) = trigger_queue(8);
        let app = app_with(Arc::new(InMemoryConversationStore::default()), triggers);

        let created = app
            .clone()
            .oneshot(post(
                "/tenants/acme/conversations/c-1/messages",
                r#"{"sender": "customer", "content": "Does the serum ship today?", "language": "en"}"#,
            ))
            .await
            .expect("post");
        assert_eq!(created.status(), StatusCode::CREATED);
        let message = json_body(created).await;
        assert_eq!(message["sender"], "customer");
        assert_eq!(message["auto_generated"], false);

        let response =
            app.oneshot(get("/tenants/acme/conversations/c-1/suggestions")).await.expect("get");
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["suggestions"][0]["text"], "Yes, the serum ships today.");
        assert_eq!(payload["context_used"], false);
    }

    #[tokio::test]
    async fn unknown_sender_is_a_bad_request() {
        let (triggers, _queue) = trigger_queue(8);
        let app = app_with(Arc::new(InMemoryConversationStore::default()), triggers);

        let response = app
            .oneshot(post(
                "/tenants/acme/conversations/c-1/messages",
                r#"{"sender": "robot", "content": "beep"}"#,
            ))
            .await
            .expect("post");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = json_body(response).await;
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn blank_content_is_a_bad_request() {
        let (triggers, _queue) = trigger_queue(8);
        let app = app_with(Arc::new(InMemoryConversationStore::default()), triggers);

        let response = app
            .oneshot(post(
                "/tenants/acme/conversations/c-1/messages",
                r#"{"sender": "agent", "content": "   "}"#,
            ))
            .await
            .expect("post");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn storage_outage_maps_to_service_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 1).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let conversations = Arc::new(SqlConversationRepository::new(pool.clone()));
        pool.close().await;
        let (triggers, _queue) = trigger_queue(8);
        let app = app_with(conversations, triggers);

        let response =
            app.oneshot(get("/tenants/acme/conversations/c-1/suggestions")).await.expect("get");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "The service is temporarily unavailable. Please retry shortly.");
    }
}
