// AI Provider Service
// Chat backends for the rewrite gateway (OpenAI-compatible and Anthropic)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use super::config_store::{ConfigStore, HumanizerConfig};
use crate::models::SamplingParams;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured for provider '{0}'")]
    MissingApiKey(String),
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// How far a backend can be held to a JSON-only reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMode {
    /// The API enforces a JSON object response.
    Strict,
    /// Only the instructions ask for JSON.
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    /// User turns, sent in order.
    pub user: Vec<String>,
    pub sampling: SamplingParams,
    pub max_tokens: u32,
    pub want_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

/// One vendor's chat API. The gateway only talks to this trait.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    fn json_mode(&self) -> JsonMode;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResult, ProviderError>;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` endpoint with JSON mode.
pub struct OpenAiChatBackend {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenAiChatBackend {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_request(request: &ChatRequest) -> OpenAiRequest {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: request.system.clone(),
        }];
        messages.extend(request.user.iter().map(|u| ChatMessage {
            role: "user".to_string(),
            content: u.clone(),
        }));

        OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            frequency_penalty: request.sampling.frequency_penalty,
            presence_penalty: request.sampling.presence_penalty,
            seed: request.sampling.seed,
            response_format: request.want_json.then(|| ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn json_mode(&self) -> JsonMode {
        JsonMode::Strict
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResult, ProviderError> {
        let body = Self::build_request(request);
        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContent>>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

/// Anthropic `/v1/messages`. No JSON mode and no penalties or seed.
pub struct AnthropicBackend {
    client: Client,
    url: String,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_request(request: &ChatRequest) -> AnthropicRequest {
        if request.sampling.seed.is_some()
            || request.sampling.frequency_penalty != 0.0
            || request.sampling.presence_penalty != 0.0
        {
            debug!("[PROVIDER] anthropic ignores seed and penalty parameters");
        }

        AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            // Consecutive user turns are folded into one message.
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.user.join("\n\n"),
            }],
            temperature: request.sampling.temperature.clamp(0.0, 1.0),
            top_p: request.sampling.top_p,
        }
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn json_mode(&self) -> JsonMode {
        JsonMode::BestEffort
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResult, ProviderError> {
        let body = Self::build_request(request);
        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .content
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.text)
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }
}

/// Shared HTTP client, optionally routed through a proxy.
pub fn build_http_client(proxy_url: Option<&str>) -> Result<Client, ProviderError> {
    let mut builder = Client::builder().timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
    if let Some(url) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::all(url)?);
    }
    Ok(builder.build()?)
}

fn provider_url(provider: &str, config: &HumanizerConfig) -> String {
    let (env_key, default_url) = match provider {
        "anthropic" | "claude" => ("ANTHROPIC_API_URL", ANTHROPIC_DEFAULT_URL),
        _ => ("OPENAI_API_URL", OPENAI_DEFAULT_URL),
    };

    env::var(env_key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config.providers.get(provider).and_then(|p| p.base_url.clone()))
        .unwrap_or_else(|| default_url.to_string())
}

/// Pick the chat backend for `provider`, resolving its key and URL.
pub fn backend_for_provider(
    provider: &str,
    config: &HumanizerConfig,
) -> Result<Arc<dyn ChatBackend>, ProviderError> {
    let api_key = get_api_key(provider)
        .or_else(|| config.api_keys.get(provider).cloned())
        .ok_or_else(|| ProviderError::MissingApiKey(provider.to_string()))?;
    let client = build_http_client(config.proxy.as_ref().and_then(|p| p.active_url()))?;
    let url = provider_url(provider, config);

    match provider {
        "openai" => Ok(Arc::new(OpenAiChatBackend::new(client, url, api_key))),
        "anthropic" | "claude" => Ok(Arc::new(AnthropicBackend::new(client, url, api_key))),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str) -> Option<String> {
    let env_keys = match provider {
        "openai" => vec!["OPENAI_API_KEY", "HUMANIZER_OPENAI_API_KEY"],
        "anthropic" | "claude" => vec!["ANTHROPIC_API_KEY", "HUMANIZER_ANTHROPIC_API_KEY"],
        "detection" => vec!["DETECTION_API_KEY", "HUMANIZER_DETECTION_API_KEY"],
        _ => vec![],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(config_dir) = ConfigStore::default_config_dir() {
        let store = ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(provider) {
            return Some(key);
        }
    }

    None
}
