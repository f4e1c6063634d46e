use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::ModelConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{ModelClient, ModelError};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Single-attempt REST client for a `generateContent`/`embedContent` style API.
///
/// Wrap it in [`crate::retry::RetryingModelClient`] for retry and backoff.
pub struct HttpModelClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl HttpModelClient {
    /// Fails with `Unavailable` when no API key is configured.
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or(ModelError::Unavailable)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ModelError::Network(error.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    fn model_url(&self, model: &str, method: Option<&str>) -> String {
        match method {
            Some(method) => format!("{}/models/{model}:{method}", self.base_url),
            None => format!("{}/models/{model}", self.base_url),
        }
    }

    async fn post(&self, url: String, body: &Value) -> Result<Value, ModelError> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status: status.as_u16(), body });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn generate_text(&self, prompt: &str, context: &str) -> Result<String, ModelError> {
        let body = build_generate_body(prompt, context);
        let url = self.model_url(&self.model, Some("generateContent"));
        debug!(event_name = "model.generate.request", model = %self.model, "sending generation request");

        let response = self.post(url, &body).await?;
        extract_text(response)
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let body = build_embed_body(&self.embedding_model, text);
        let url = self.model_url(&self.embedding_model, Some("embedContent"));

        let response = self.post(url, &body).await?;
        extract_embedding(response)
    }

    async fn health_check(&self) -> Result<(), ModelError> {
        let response = self
            .http
            .get(self.model_url(&self.model, None))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ModelError::Api { status: status.as_u16(), body })
        }
    }
}

/// Context travels as a preamble part of the same user turn.
fn build_generate_body(prompt: &str, context: &str) -> Value {
    let mut parts = Vec::with_capacity(2);
    if !context.trim().is_empty() {
        parts.push(json!({ "text": format!("Relevant knowledge:\n{context}") }));
    }
    parts.push(json!({ "text": prompt }));

    json!({ "contents": [{ "role": "user", "parts": parts }] })
}

fn build_embed_body(model: &str, text: &str) -> Value {
    json!({
        "model": format!("models/{model}"),
        "content": { "parts": [{ "text": text }] }
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: Option<GenerateContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateContent {
    #[serde(default)]
    parts: Vec<GeneratePart>,
}

#[derive(Debug, Deserialize)]
struct GeneratePart {
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(response: Value) -> Result<String, ModelError> {
    let parsed: GenerateResponse =
        serde_json::from_value(response).map_err(|error| ModelError::Decode(error.to_string()))?;

    let content = parsed
        .candidates
        .into_iter()
        .find_map(|candidate| candidate.content)
        .ok_or_else(|| ModelError::Decode("response has no candidates".to_string()))?;

    Ok(content.parts.into_iter().filter_map(|part| part.text).collect::<Vec<_>>().join(""))
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

fn extract_embedding(response: Value) -> Result<Vec<f32>, ModelError> {
    let parsed: EmbedResponse =
        serde_json::from_value(response).map_err(|error| ModelError::Decode(error.to_string()))?;
    if parsed.embedding.values.is_empty() {
        return Err(ModelError::Decode("embedding is empty".to_string()));
    }
    Ok(parsed.embedding.values)
}
