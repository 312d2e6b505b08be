//! Text-in / text-out access to the language model.
//!
//! The pipeline only needs one operation: send a system prompt and a user
//! prompt, get text back or nothing. [`Oracle`] is that seam. [`OpenAiClient`]
//! implements it against any OpenAI-compatible `chat/completions` endpoint.

use crate::error::{Error, Result, Stage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
/// Default chat model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8_192;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A language model treated as an opaque text transform.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Sends one request.
    ///
    /// Returns `Ok(None)` when the model answered without usable content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] or [`Error::Status`] tagged with `stage`
    /// when the request itself fails.
    async fn complete(&self, stage: Stage, system: &str, prompt: &str) -> Result<Option<String>>;
}

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL, without the trailing `/chat/completions`
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Upper bound on generated tokens per request
    pub max_output_tokens: u32,

    /// Sampling temperature, endpoint default when unset
    pub temperature: Option<f32>,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl LlmConfig {
    /// Creates settings for the default endpoint and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the output token limit.
    #[must_use]
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::config(
                "An API key is required (set OPENAI_API_KEY or pass --api-key)",
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Returns the model name requests are sent to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Oracle for OpenAiClient {
    async fn complete(&self, stage: Stage, system: &str, prompt: &str) -> Result<Option<String>> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };

        trace!("Sending {} request ({} prompt bytes)", stage, prompt.len());

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::transport(stage, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(Error::Status {
                stage,
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::transport(stage, format!("Failed to parse response: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|text| !text.trim().is_empty());

        debug!(
            "{} answered with {} bytes",
            stage,
            content.as_ref().map_or(0, String::len)
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_path() {
        let config = LlmConfig::new("k").base_url("http://localhost:8080/v1/");
        assert_eq!(config.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_defaults() {
        let config = LlmConfig::new("k");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.temperature.is_none());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = OpenAiClient::new(LlmConfig::new("  "));
        assert!(matches!(result, Err(ref e) if e.is_config()));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "m",
            messages: [
                Message {
                    role: "system",
                    content: "s",
                },
                Message {
                    role: "user",
                    content: "u",
                },
            ],
            max_tokens: 10,
            temperature: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_with_null_content() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(response.choices[0]
            .message
            .as_ref()
            .and_then(|m| m.content.as_ref())
            .is_none());
    }
}
