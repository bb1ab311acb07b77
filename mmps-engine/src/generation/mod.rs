//! Text-generation client contract
//!
//! One call in, one text out. A client never retries on its own; wrap it in
//! [`RetryingClient`] when the caller wants retries.
//!
//! # Request constraints
//! - Conversation is non-empty and ends with a user turn
//! - `max_output_tokens > 0`
//! - `temperature` in `[0, 2]`
//!
//! Violations are rejected by [`GenerationRequest::new`] before any network
//! traffic happens.

pub mod openai;
pub mod retry;

pub use openai::{ModelNames, OpenAiClient, OpenAiSettings};
pub use retry::RetryingClient;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation client errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// Whether repeating the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Network(_) | GenerationError::MalformedResponse(_) => true,
            GenerationError::Api(status, _) => *status == 429 || *status >= 500,
            GenerationError::InvalidRequest(_) | GenerationError::Authentication(_) => false,
        }
    }
}

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Ordered message list sent in a single call
///
/// Stages never accumulate turns: every call builds a fresh
/// system-directive + user-turn pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// System directive followed by exactly one user turn
    pub fn single_turn(system_directive: &str, user_content: impl Into<String>) -> Self {
        Self::new(vec![
            Message::system(system_directive),
            Message::user(user_content),
        ])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Content of the final user turn, if the conversation ends with one
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Model capability class, mapped to a concrete model name by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// Cheap model for stages 1-4
    Fast,
    /// Capable model for the final summary and scoring
    Strong,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Fast => write!(f, "fast"),
            ModelTier::Strong => write!(f, "strong"),
        }
    }
}

/// Validated generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    conversation: Conversation,
    tier: ModelTier,
    max_output_tokens: u32,
    temperature: f32,
}

impl GenerationRequest {
    pub fn new(
        conversation: Conversation,
        tier: ModelTier,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<Self, GenerationError> {
        if conversation.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "conversation is empty".to_string(),
            ));
        }
        if conversation.last_user_content().is_none() {
            return Err(GenerationError::InvalidRequest(
                "conversation must end with a user turn".to_string(),
            ));
        }
        if max_output_tokens == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        // NaN fails the range check too
        if !(0.0..=2.0).contains(&temperature) {
            return Err(GenerationError::InvalidRequest(format!(
                "temperature {} outside [0, 2]",
                temperature
            )));
        }

        Ok(Self {
            conversation,
            tier,
            max_output_tokens,
            temperature,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

/// Call-and-get-text capability against a text-generation service
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate text for a validated request
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
