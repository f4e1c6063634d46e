use async_trait::async_trait;
use thiserror::Error;

use crate::retry::{classify, ErrorClass};

/// Failure reported by the external generation/embedding API.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("model client is not configured")]
    Unavailable,
    #[error("model API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("model request timed out")]
    Timeout,
    #[error("model request failed: {0}")]
    Network(String),
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

impl ModelError {
    /// Retry class, or `None` for local failures that no retry can fix.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Api { status, body } => Some(classify(*status, body)),
            Self::Timeout | Self::Network(_) => Some(ErrorClass::Transient),
            Self::Unavailable | Self::Decode(_) => None,
        }
    }

    /// Short label used in logs.
    pub fn class_label(&self) -> &'static str {
        match self.class() {
            Some(class) => class.as_str(),
            None => match self {
                Self::Unavailable => "unavailable",
                _ => "malformed_response",
            },
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

/// Contract of the untrusted generative model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// `context` is retrieved knowledge sent alongside the prompt; may be empty.
    async fn generate_text(&self, prompt: &str, context: &str) -> Result<String, ModelError>;

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    async fn health_check(&self) -> Result<(), ModelError>;
}

/// Stand-in used when no API key is configured; every call reports `Unavailable`.
#[derive(Clone, Debug, Default)]
pub struct DisabledModelClient;

#[async_trait]
impl ModelClient for DisabledModelClient {
    async fn generate_text(&self, _prompt: &str, _context: &str) -> Result<String, ModelError> {
        Err(ModelError::Unavailable)
    }

    async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::Unavailable)
    }

    async fn health_check(&self) -> Result<(), ModelError> {
        Err(ModelError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::{DisabledModelClient, ModelClient, ModelError};
    use crate::retry::ErrorClass;

    #[test]
    fn local_failures_have_no_retry_class() {
        assert_eq!(ModelError::Unavailable.class(), None);
        assert_eq!(ModelError::Decode("bad json".to_string()).class(), None);
        assert_eq!(ModelError::Timeout.class(), Some(ErrorClass::Transient));
        assert_eq!(ModelError::Unavailable.class_label(), "unavailable");
    }

    #[test]
    fn auth_failures_are_client_errors() {
        let error = ModelError::Api { status: 401, body: "API key not valid".to_string() };
        assert!(error.is_auth_failure());
        assert_eq!(error.class(), Some(ErrorClass::ClientError));
    }

    #[tokio::test]
    async fn disabled_client_reports_unavailable() {
        let client = DisabledModelClient;
        assert_eq!(client.generate_text("hi", "").await, Err(ModelError::Unavailable));
        assert_eq!(client.health_check().await, Err(ModelError::Unavailable));
    }
}
