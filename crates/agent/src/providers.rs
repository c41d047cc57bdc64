//! HTTP completion clients for the supported chat providers.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use twinquery_core::config::{LlmConfig, LlmProvider};

use crate::llm::LlmClient;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const AZURE_DEFAULT_API_VERSION: &str = "2024-06-01";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 500, max_delay_ms: 8_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Debug, Error)]
enum CompletionFailure {
    #[error("{provider} request failed: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("{provider} returned HTTP {status}: {body}")]
    Http { provider: &'static str, status: u16, body: String },
    #[error("{provider} response could not be parsed: {message}")]
    Parse { provider: &'static str, message: String },
}

impl CompletionFailure {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } => false,
        }
    }
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: Option<String>,
    model: String,
    api_version: Option<String>,
    max_tokens: u32,
    retry_policy: RetryPolicy,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| anyhow!("failed to build completion http client: {error}"))?;

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_version: config.api_version.clone(),
            max_tokens: config.max_tokens,
            retry_policy: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAi => "openai",
            LlmProvider::AzureOpenAi => "azure_openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Ollama => "ollama",
        }
    }

    fn base_url(&self, default: &str) -> String {
        self.base_url.as_deref().unwrap_or(default).trim_end_matches('/').to_string()
    }

    fn api_key(&self) -> &str {
        self.api_key.as_ref().map(|key| key.expose_secret()).unwrap_or("")
    }

    fn build_request(&self, system_instructions: &str, user_prompt: &str) -> reqwest::RequestBuilder {
        let messages = json!([
            { "role": "system", "content": system_instructions },
            { "role": "user", "content": user_prompt },
        ]);

        match self.provider {
            LlmProvider::OpenAi => self
                .client
                .post(format!("{}/chat/completions", self.base_url(OPENAI_BASE_URL)))
                .bearer_auth(self.api_key())
                .json(&json!({
                    "model": self.model,
                    "messages": messages,
                    "max_tokens": self.max_tokens,
                    "temperature": 0,
                })),
            LlmProvider::AzureOpenAi => {
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    self.base_url(""),
                    self.model,
                    self.api_version.as_deref().unwrap_or(AZURE_DEFAULT_API_VERSION)
                );
                self.client.post(url).header("api-key", self.api_key()).json(&json!({
                    "messages": messages,
                    "max_tokens": self.max_tokens,
                    "temperature": 0,
                }))
            }
            LlmProvider::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.base_url(ANTHROPIC_BASE_URL)))
                .header("x-api-key", self.api_key())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "system": system_instructions,
                    "messages": [{ "role": "user", "content": user_prompt }],
                    "temperature": 0,
                })),
            LlmProvider::Ollama => self
                .client
                .post(format!("{}/api/chat", self.base_url(OLLAMA_BASE_URL)))
                .json(&json!({
                    "model": self.model,
                    "messages": messages,
                    "stream": false,
                    "options": { "temperature": 0 },
                })),
        }
    }

    async fn attempt(
        &self,
        system_instructions: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionFailure> {
        let provider = self.provider_name();
        let response = self
            .build_request(system_instructions, user_prompt)
            .send()
            .await
            .map_err(|error| CompletionFailure::Transport { provider, message: error.to_string() })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| CompletionFailure::Transport { provider, message: error.to_string() })?;

        if !(200..300).contains(&status) {
            return Err(CompletionFailure::Http { provider, status, body });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|error| CompletionFailure::Parse { provider, message: error.to_string() })?;
        extract_text(self.provider, &value).ok_or_else(|| CompletionFailure::Parse {
            provider,
            message: "response did not contain completion text".to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system_instructions: &str, user_prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.attempt(system_instructions, user_prompt).await {
                Ok(text) => {
                    debug!(
                        event_name = "llm.completion.received",
                        provider = self.provider_name(),
                        attempt,
                        chars = text.len(),
                        "completion received"
                    );
                    return Ok(text);
                }
                Err(failure) if failure.is_retryable() && attempt < self.retry_policy.max_retries => {
                    warn!(
                        event_name = "llm.completion.retry",
                        provider = self.provider_name(),
                        attempt,
                        max_retries = self.retry_policy.max_retries,
                        error = %failure,
                        "completion request failed; retrying"
                    );
                    tokio::time::sleep(self.retry_policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }
}

fn extract_text(provider: LlmProvider, value: &Value) -> Option<String> {
    match provider {
        LlmProvider::OpenAi | LlmProvider::AzureOpenAi => value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        LlmProvider::Anthropic => {
            let blocks = value.get("content")?.as_array()?;
            let text = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("");
            Some(text)
        }
        LlmProvider::Ollama => {
            value.pointer("/message/content").and_then(Value::as_str).map(str::to_string)
        }
    }
}
