//! Well-known document probe.
//!
//! A probe issues one logical request per key against a fixed path, applies
//! the timeout/retry policy, validates the response shape and returns a typed
//! [`Outcome`]. All failure modes degrade to `NotFound` (or `Unresolved`, see
//! [`ScanConfig::cache_transient_failures`]) except resource exhaustion, which
//! is surfaced as an error so the scheduler can stop dispatching.

use crate::error::ScanError;
use crate::types::{Outcome, Payload, ScanConfig};
use crate::utils::{build_probe_url, validate_key};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Field describing the plugin to the model.
pub const DESCRIPTION_FIELD: &str = "description_for_model";

/// Field describing the plugin's API.
pub const API_FIELD: &str = "api";

/// Something that can classify a single key.
///
/// `HttpProber` is the production implementation; tests plug in fakes.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, key: &str) -> Result<Outcome, ScanError>;
}

#[async_trait]
impl<P: Prober + ?Sized> Prober for std::sync::Arc<P> {
    async fn probe(&self, key: &str) -> Result<Outcome, ScanError> {
        (**self).probe(key).await
    }
}

/// HTTP prober for `/.well-known/ai-plugin.json`.
#[derive(Clone)]
pub struct HttpProber {
    /// HTTP client shared by every attempt
    http_client: reqwest::Client,
    /// URL template containing `{domain}`
    url_template: String,
    /// Budget of one attempt
    attempt_timeout: Duration,
    /// Total attempts, first try included
    max_attempts: u32,
    /// Base delay between attempts
    retry_backoff: Duration,
    /// Degrade exhausted transient failures to `NotFound` (true) or `Unresolved`
    cache_transient_failures: bool,
}

impl HttpProber {
    /// Create a prober with default settings.
    pub fn new() -> Result<Self, ScanError> {
        Self::with_config(&ScanConfig::default())
    }

    /// Create a prober from a scan configuration.
    pub fn with_config(config: &ScanConfig) -> Result<Self, ScanError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.attempt_timeout + Duration::from_secs(2)) // Add buffer for HTTP timeout
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScanError::network_with_source("Failed to create HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            url_template: config.url_template.clone(),
            attempt_timeout: config.attempt_timeout,
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
            cache_transient_failures: config.cache_transient_failures,
        })
    }

    /// One HTTP attempt.
    ///
    /// Returns `Err` only for conditions worth retrying (or resource
    /// exhaustion); everything else is already classified.
    async fn attempt(&self, url: &str, key: &str) -> Result<Outcome, ScanError> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();

        tracing::debug!(key, status = status.as_u16(), "probe response");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScanError::http_status(key, status.as_u16()));
        }
        if !status.is_success() {
            return Ok(Outcome::NotFound);
        }

        let body = response.bytes().await?;
        Ok(classify_body(&body))
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, key: &str) -> Result<Outcome, ScanError> {
        if let Err(e) = validate_key(key) {
            tracing::debug!(key, error = %e, "skipping invalid key");
            return Ok(Outcome::NotFound);
        }

        let url = build_probe_url(&self.url_template, key);
        if reqwest::Url::parse(&url).is_err() {
            tracing::debug!(key, url = %url, "unparsable probe url");
            return Ok(Outcome::NotFound);
        }

        for attempt in 1..=self.max_attempts {
            let err = match tokio::time::timeout(self.attempt_timeout, self.attempt(&url, key)).await
            {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(e)) if e.is_resource_exhaustion() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => ScanError::timeout("well-known probe", self.attempt_timeout),
            };

            tracing::debug!(key, attempt, error = %err, "probe attempt failed");

            if !err.is_retryable() {
                return Ok(Outcome::NotFound);
            }
            if attempt < self.max_attempts {
                let delay = self.backoff_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::debug!(key, attempts = self.max_attempts, "probe retries exhausted");

        if self.cache_transient_failures {
            Ok(Outcome::NotFound)
        } else {
            Ok(Outcome::Unresolved)
        }
    }
}

/// Classify a successful response body.
pub fn classify_body(body: &[u8]) -> Outcome {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => match validate_document(&value) {
            Some(payload) => Outcome::Found(payload),
            None => Outcome::NotFound,
        },
        Err(_) => Outcome::NotFound,
    }
}

/// Validity predicate for well-known documents.
///
/// A document is valid when it is a JSON object, does not carry a `status`
/// marker of 404 (number or string, both show up in the wild), and has truthy
/// description and API fields.
pub fn validate_document(value: &Value) -> Option<Payload> {
    let object = value.as_object()?;

    if let Some(status) = object.get("status") {
        let is_404 = status.as_f64() == Some(404.0) || status.as_str() == Some("404");
        if is_404 {
            return None;
        }
    }

    if !is_truthy(object.get(DESCRIPTION_FIELD)) || !is_truthy(object.get(API_FIELD)) {
        return None;
    }

    Some(object.clone())
}

/// Check a payload that is already a map (e.g. loaded from a store file).
pub fn is_valid_payload(payload: &Payload) -> bool {
    is_truthy(payload.get(DESCRIPTION_FIELD)) && is_truthy(payload.get(API_FIELD))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
