//! Retry and backoff for calls to the external model API.
//!
//! Failures are classified before any retry decision: an exhausted quota is a
//! daily ceiling and fails immediately, a rate limit waits for the vendor's
//! hint, client errors fail immediately, and everything transient backs off
//! exponentially within the retry budget.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::ModelConfig;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::{ModelClient, ModelError};

/// Actionable classification of model API failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota for the current period is spent. Never retried.
    QuotaExhausted,
    /// HTTP 429 without quota markers. Retried after the vendor hint.
    RateLimited,
    /// 400/401/403/404 and other non-retryable 4xx.
    ClientError,
    /// 5xx, timeouts, and network failures.
    Transient,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExhausted => "quota_exhausted",
            Self::RateLimited => "rate_limited",
            Self::ClientError => "client_error",
            Self::Transient => "transient",
        }
    }
}

const QUOTA_MARKERS: &[&str] = &[
    "exceeded your current quota",
    "resource_exhausted",
    "insufficient_quota",
    "quota exceeded",
];

/// Classifies an HTTP failure from its status and response body.
///
/// A structured `{"error": {..., "details": [...]}}` body is consulted first:
/// a per-day `QuotaFailure` means quota, a `RetryInfo` on a 429 means rate
/// limit. Otherwise the body text is matched against quota markers, and a
/// quota marker wins over a 429 status.
pub fn classify(status: u16, body: &str) -> ErrorClass {
    if let Some(structured) = StructuredError::parse(body) {
        if structured.has_daily_quota_failure() {
            return ErrorClass::QuotaExhausted;
        }
        if status == 429 && structured.retry_delay().is_some() {
            return ErrorClass::RateLimited;
        }
    }

    let lower = body.to_ascii_lowercase();
    if QUOTA_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return ErrorClass::QuotaExhausted;
    }

    match status {
        429 => ErrorClass::RateLimited,
        408 => ErrorClass::Transient,
        400..=499 => ErrorClass::ClientError,
        _ => ErrorClass::Transient,
    }
}

/// Vendor-supplied wait before retrying a rate-limited call.
pub fn retry_hint(body: &str) -> Option<Duration> {
    if let Some(delay) = StructuredError::parse(body).and_then(|error| error.retry_delay()) {
        return Some(delay);
    }

    let captures = retry_hint_pattern()?.captures(body)?;
    let seconds = captures.get(1)?.as_str().parse::<f64>().ok()?;
    seconds_to_duration(seconds)
}

fn retry_hint_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)retry in\s+([0-9]+(?:\.[0-9]+)?)\s*s").ok())
        .as_ref()
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StructuredError,
}

#[derive(Debug, Default, Deserialize)]
struct StructuredError {
    #[serde(default)]
    details: Vec<Value>,
}

impl StructuredError {
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<ErrorEnvelope>(body).ok().map(|envelope| envelope.error)
    }

    fn detail_of_type(&self, type_suffix: &str) -> impl Iterator<Item = &Value> + '_ {
        let suffix = type_suffix.to_string();
        self.details.iter().filter(move |detail| {
            detail.get("@type").and_then(Value::as_str).is_some_and(|kind| kind.ends_with(&suffix))
        })
    }

    fn retry_delay(&self) -> Option<Duration> {
        self.detail_of_type("RetryInfo").find_map(|detail| {
            let raw = detail.get("retryDelay")?.as_str()?;
            let seconds = raw.trim().trim_end_matches('s').parse::<f64>().ok()?;
            seconds_to_duration(seconds)
        })
    }

    fn has_daily_quota_failure(&self) -> bool {
        self.detail_of_type("QuotaFailure")
            .filter_map(|detail| detail.get("violations").and_then(Value::as_array))
            .flatten()
            .any(|violation| {
                ["quotaId", "description"].iter().any(|field| {
                    violation.get(*field).and_then(Value::as_str).is_some_and(|text| {
                        let lower = text.to_ascii_lowercase();
                        lower.contains("perday") || lower.contains("per day")
                    })
                })
            })
    }
}

/// Retry budget and backoff shape.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff; doubled on each further retry.
    pub base_delay: Duration,
    /// Multiplier applied to the vendor's rate-limit hint.
    pub rate_limit_padding: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(1), rate_limit_padding: 1.1 }
    }
}

impl From<&ModelConfig> for RetryPolicy {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            rate_limit_padding: config.rate_limit_padding,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry_index + 1`: base, 2*base, 4*base, ...
    pub fn backoff(&self, retry_index: u32) -> Duration {
        self.base_delay.saturating_mul(1u32.checked_shl(retry_index).unwrap_or(u32::MAX))
    }

    /// Delay before the next attempt, or `None` when the error is terminal or
    /// the budget is spent.
    pub fn next_delay(&self, error: &ModelError, retries_used: u32) -> Option<Duration> {
        if retries_used >= self.max_retries {
            return None;
        }

        match error.class()? {
            ErrorClass::Transient => Some(self.backoff(retries_used)),
            ErrorClass::RateLimited => {
                let ModelError::Api { body, .. } = error else {
                    return None;
                };
                retry_hint(body).map(|hint| hint.mul_f64(self.rate_limit_padding))
            }
            ErrorClass::QuotaExhausted | ErrorClass::ClientError => None,
        }
    }

    /// Runs `call` until it succeeds or the failure is not worth retrying.
    /// The caller is blocked for the whole retry sequence.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut retries_used = 0;

        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let Some(delay) = self.next_delay(&error, retries_used) else {
                tracing::warn!(
                    event_name = "model.call.failed",
                    operation,
                    attempts = retries_used + 1,
                    error_class = error.class_label(),
                    error = %error,
                    "model call failed"
                );
                return Err(error);
            };

            retries_used += 1;
            tracing::warn!(
                event_name = "model.retry.scheduled",
                operation,
                attempt = retries_used,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error_class = error.class_label(),
                "retrying model call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wraps any [`ModelClient`] with classified retry and backoff.
///
/// Health checks are passed through without retry.
pub struct RetryingModelClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingModelClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C: ModelClient> ModelClient for RetryingModelClient<C> {
    async fn generate_text(&self, prompt: &str, context: &str) -> Result<String, ModelError> {
        self.policy.run("generate_text", || self.inner.generate_text(prompt, context)).await
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.policy.run("generate_embedding", || self.inner.generate_embedding(text)).await
    }

    async fn health_check(&self) -> Result<(), ModelError> {
        self.inner.health_check().await
    }
}
