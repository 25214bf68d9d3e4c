//! HTTP client for OpenAI-compatible chat completion APIs (OpenRouter by default)

use std::time::Duration;

use reqwest::Client as HttpClient;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{ChatRequest, ChatResponse, Completion, Message, ResponseFormat};

/// Attempts per request when the API rate limits us
const MAX_ATTEMPTS: u32 = 3;

/// First backoff step in milliseconds
const BACKOFF_BASE_MS: u64 = 1000;

/// Upper bound for a single backoff in milliseconds
const BACKOFF_CAP_MS: u64 = 30_000;

/// Chat completion client
#[derive(Clone)]
pub struct LlmClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Builder for [`LlmClient`]
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl LlmClientBuilder {
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the configured base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::LLMError("API key is required".to_string()))?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let base_url = self
            .base_url
            .unwrap_or(config.base_url)
            .trim_end_matches('/')
            .to_string();

        Ok(LlmClient {
            http,
            base_url,
            api_key,
            model: config.default_model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

impl LlmClient {
    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::default()
    }

    /// Build a client from configuration, reading the API key from the environment
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::LLMError("no API key set (KPGRAPH_API_KEY or OPENROUTER_API_KEY)".into())
            })?;

        Self::builder().config(config.clone()).api_key(api_key).build()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run a chat completion that must answer with a JSON object
    pub async fn complete_json(&self, messages: Vec<Message>) -> Result<Completion> {
        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_response_format(ResponseFormat::json_object());
        self.execute(&request).await
    }

    async fn execute(&self, request: &ChatRequest) -> Result<Completion> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(request).await {
                Err(Error::RateLimited(wait_secs)) if attempt < MAX_ATTEMPTS => {
                    let delay = backoff_ms(attempt, wait_secs);
                    warn!(attempt, delay_ms = delay, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                other => return other,
            }
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "kpgraph")
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        let completion = Completion::from_response(body)
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))?;
        debug!(model = %completion.model, tokens = completion.total_tokens, "Chat completion received");
        Ok(completion)
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: u16, body: &str) -> Error {
    match status {
        401 => Error::LLMError("Unauthorized: invalid API key".to_string()),
        402 => Error::LLMError("Payment required: insufficient credits".to_string()),
        429 => Error::RateLimited(retry_after(body).unwrap_or(60)),
        400 => Error::LLMError(format!("Bad request: {}", body)),
        404 => Error::LLMError(format!("Model or endpoint not found: {}", body)),
        500..=599 => Error::LLMError(format!("Server error ({}): {}", status, body)),
        _ => Error::LLMError(format!("HTTP error {}: {}", status, body)),
    }
}

/// `retry_after` seconds from an error body, top-level or under `error`
fn retry_after(body: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.get("error").and_then(|e| e.get("retry_after")))
        .and_then(serde_json::Value::as_u64)
}

/// Exponential backoff, never shorter than the server's hint, capped
fn backoff_ms(attempt: u32, suggested_secs: u64) -> u64 {
    let exponential = BACKOFF_BASE_MS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    exponential
        .max(suggested_secs.saturating_mul(1000))
        .min(BACKOFF_CAP_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_api_key() {
        assert!(LlmClient::builder().build().is_err());
        assert!(LlmClient::builder().api_key("  ").build().is_err());
    }

    #[test]
    fn test_builder_trims_base_url() {
        let client = LlmClient::builder()
            .api_key("sk-test")
            .base_url("http://localhost:9999/v1/")
            .build()
            .unwrap();
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.model(), LlmConfig::default().default_model);
        assert!(!format!("{:?}", client).contains("sk-test"));
    }

    #[test]
    fn test_status_errors() {
        assert!(matches!(status_error(429, r#"{"retry_after": 5}"#), Error::RateLimited(5)));
        assert!(matches!(
            status_error(429, r#"{"error": {"retry_after": 9}}"#),
            Error::RateLimited(9)
        ));
        assert!(matches!(status_error(429, "busy"), Error::RateLimited(60)));
        assert!(matches!(status_error(401, ""), Error::LLMError(_)));
        assert!(matches!(status_error(503, "down"), Error::LLMError(ref m) if m.contains("503")));
    }

    #[test]
    fn test_backoff() {
        assert_eq!(backoff_ms(1, 0), 1000);
        assert_eq!(backoff_ms(2, 0), 2000);
        assert_eq!(backoff_ms(2, 5), 5000);
        assert_eq!(backoff_ms(3, 600), BACKOFF_CAP_MS);
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmClient>();
    }
}
