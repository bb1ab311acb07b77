//! OpenAI-compatible chat-completions client
//!
//! POSTs `{model, messages, max_tokens, temperature}` to
//! `{base_url}/chat/completions` and returns the trimmed content of the first
//! choice.

use super::{GenerationClient, GenerationError, GenerationRequest, Message, ModelTier};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use mmps_common::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

const USER_AGENT: &str = concat!("mmps/", env!("CARGO_PKG_VERSION"));

/// Concrete model names for each tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNames {
    pub fast: String,
    pub strong: String,
}

impl ModelNames {
    pub fn name_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Strong => &self.strong,
        }
    }
}

/// Connection settings for [`OpenAiClient`]
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub models: ModelNames,
    pub request_timeout: Duration,
    /// Client-side rate limit; `None` disables limiting
    pub requests_per_second: Option<NonZeroU32>,
}

impl OpenAiSettings {
    /// Build settings from the `[generation]` section and a resolved key
    pub fn from_config(config: &GenerationConfig, api_key: String) -> Self {
        Self {
            api_key,
            base_url: config.base_url.clone(),
            models: ModelNames {
                fast: config.fast_model.clone(),
                strong: config.strong_model.clone(),
            },
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            requests_per_second: NonZeroU32::new(config.requests_per_second),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions API client
pub struct OpenAiClient {
    http_client: reqwest::Client,
    rate_limiter: Option<DefaultDirectRateLimiter>,
    endpoint: String,
    api_key: String,
    models: ModelNames,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: settings
                .requests_per_second
                .map(|rps| RateLimiter::direct(Quota::per_second(rps))),
            endpoint: completions_endpoint(&settings.base_url),
            api_key: settings.api_key,
            models: settings.models,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let model = self.models.name_for(request.tier());
        tracing::info!(
            model,
            max_tokens = request.max_output_tokens(),
            temperature = request.temperature(),
            "Calling generation model"
        );
        tracing::trace!(
            prompt = request.conversation().last_user_content().unwrap_or_default(),
            "Generation prompt"
        );

        let body = ChatCompletionRequest {
            model,
            messages: request.conversation().messages(),
            max_tokens: request.max_output_tokens(),
            temperature: request.temperature(),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Authentication(error_text));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(status.as_u16(), error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let text = extract_content(completion)?;

        tracing::info!(model, chars = text.len(), "Received generation response");
        tracing::debug!(response = %text, "Generation response");

        Ok(text)
    }
}

/// `{base_url}/chat/completions`, tolerating a trailing slash
fn completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Trimmed content of the first choice
fn extract_content(response: ChatCompletionResponse) -> Result<String, GenerationError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("no choices in response".to_string()))?
        .message
        .content
        .ok_or_else(|| {
            GenerationError::MalformedResponse("choice has no message content".to_string())
        })?;

    let text = content.trim();
    if text.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "message content is empty".to_string(),
        ));
    }
    Ok(text.to_string())
}
