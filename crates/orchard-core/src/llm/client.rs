//! Chat completions client
//!
//! Every call is one system + user exchange POSTed to
//! `{base_url}/chat/completions`. A 429 is retried on the same model after a
//! backoff; a model the server cannot serve hands over to the next model in
//! `llm.fallback_models`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::generator::TextGenerator;
use super::types::{ChatMessage, Completion, CompletionRequest, CompletionResponse};

/// Requests per model before a rate limit is treated as final
const MAX_ATTEMPTS: u32 = 3;

/// First backoff step; doubles on every further attempt
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Client for an OpenAI-compatible completions endpoint
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    /// Default model first, then the fallbacks in order
    models: Vec<String>,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("endpoint", &self.endpoint)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct LlmClientBuilder {
    config: LlmConfig,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Use this base URL instead of `llm.base_url`
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::LLMError("API key is required".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let base_url = self.base_url.unwrap_or(self.config.base_url);
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let mut models = vec![self.config.default_model];
        models.extend(self.config.fallback_models);

        Ok(LlmClient {
            http,
            endpoint,
            api_key,
            models,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        })
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new().config(config).api_key(api_key).build()
    }

    /// Build a client whose key comes from `ORCHARD_API_KEY` or `OPENROUTER_API_KEY`
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::LLMError(
                    "API key not configured. Set ORCHARD_API_KEY or OPENROUTER_API_KEY environment variable."
                        .to_string(),
                )
            })?;
        Self::new(config, api_key)
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    /// Full URL requests are POSTed to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Models tried in order, the configured default first
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Ask the first model that can answer
    pub async fn complete_first_available(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let mut last_error = None;

        for model in &self.models {
            match self.complete(model, messages).await {
                Ok(completion) => return Ok(completion),
                Err(e @ (Error::RateLimited(_) | Error::ModelUnavailable { .. })) => {
                    warn!(model = %model, error = %e, "Trying next model");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoSuitableModel("no models configured".to_string())))
    }

    /// Ask one model, retrying while it is rate limited
    pub async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion> {
        let mut attempt = 1;
        loop {
            match self.post(model, messages).await {
                Err(Error::RateLimited(retry_after)) if attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt, retry_after);
                    warn!(model = %model, attempt, delay_ms = delay.as_millis() as u64, "Rate limited");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn post(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion> {
        let body = CompletionRequest {
            model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(model = %model, endpoint = %self.endpoint, "Requesting completion");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(model, status, retry_after, &text));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Unreadable completion from {}: {}", model, e)))?;

        let completion = Completion::from_response(parsed)
            .ok_or_else(|| Error::LLMError(format!("Empty response from {}", model)))?;
        info!(model = %model, tokens = completion.total_tokens, "Completion received");
        Ok(completion)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];
        let completion = self.complete_first_available(&messages).await?;
        if completion.truncated {
            warn!(model = %completion.model, "Completion stopped at max_tokens");
        }
        Ok(completion.text)
    }
}

/// Classify a non-2xx reply from `model`
fn status_error(model: &str, status: StatusCode, retry_after: Option<u64>, body: &str) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(retry_after.unwrap_or(0)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::LLMError(format!(
            "Unauthorized ({}). Check ORCHARD_API_KEY or OPENROUTER_API_KEY",
            status.as_u16()
        )),
        StatusCode::NOT_FOUND | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            Error::ModelUnavailable {
                model: model.to_string(),
                reason: format!("{} {}", status.as_u16(), body.trim()),
            }
        }
        StatusCode::BAD_REQUEST if rejects_model(body) => Error::ModelUnavailable {
            model: model.to_string(),
            reason: body.trim().to_string(),
        },
        _ => Error::LLMError(format!("HTTP {} from {}: {}", status.as_u16(), model, body.trim())),
    }
}

/// A 400 whose body blames the model id rather than the prompt
fn rejects_model(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("model")
        && ["not found", "not a valid", "unavailable", "no endpoints"]
            .iter()
            .any(|p| body.contains(p))
}

/// Wait before attempt `attempt + 1`; never shorter than the server asked
fn backoff_delay(attempt: u32, retry_after_secs: u64) -> Duration {
    let exponential = BACKOFF_BASE * 2u32.pow(attempt.saturating_sub(1));
    exponential.max(Duration::from_secs(retry_after_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            api_key: None,
            base_url: "https://example.com/api/v1".to_string(),
            default_model: "test/model".to_string(),
            fallback_models: vec!["fallback/model".to_string()],
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_endpoint_from_config() {
        let client = LlmClient::new(test_config(), "test-key").unwrap();
        assert_eq!(client.endpoint(), "https://example.com/api/v1/chat/completions");
        assert_eq!(client.models(), ["test/model", "fallback/model"]);
    }

    #[test]
    fn test_builder_base_url_override() {
        let client = LlmClient::builder()
            .config(test_config())
            .api_key("test-key")
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_builder_requires_api_key() {
        assert!(LlmClient::builder().config(test_config()).build().is_err());
        assert!(
            LlmClient::builder()
                .config(test_config())
                .api_key("  ")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let client = LlmClient::new(test_config(), "sk-very-secret").unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("test/model"));
        assert!(!debug.contains("sk-very-secret"));
    }

    #[test]
    fn test_status_error_classification() {
        let m = "test/model";
        assert!(matches!(
            status_error(m, StatusCode::TOO_MANY_REQUESTS, Some(7), ""),
            Error::RateLimited(7)
        ));
        assert!(matches!(
            status_error(m, StatusCode::TOO_MANY_REQUESTS, None, ""),
            Error::RateLimited(0)
        ));
        assert!(matches!(
            status_error(m, StatusCode::NOT_FOUND, None, "no such model"),
            Error::ModelUnavailable { ref model, .. } if model == m
        ));
        assert!(matches!(
            status_error(m, StatusCode::SERVICE_UNAVAILABLE, None, "overloaded"),
            Error::ModelUnavailable { .. }
        ));
        assert!(matches!(
            status_error(m, StatusCode::BAD_REQUEST, None, "test/model is not a valid model ID"),
            Error::ModelUnavailable { .. }
        ));
        assert!(matches!(
            status_error(m, StatusCode::BAD_REQUEST, None, "messages must not be empty"),
            Error::LLMError(_)
        ));
        assert!(matches!(
            status_error(m, StatusCode::FORBIDDEN, None, ""),
            Error::LLMError(ref msg) if msg.starts_with("Unauthorized")
        ));
        assert!(matches!(
            status_error(m, StatusCode::INTERNAL_SERVER_ERROR, None, "boom"),
            Error::LLMError(ref msg) if msg.contains("500")
        ));
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(1, 5), Duration::from_secs(5));
        assert_eq!(backoff_delay(2, 1), Duration::from_secs(2));
    }
}
