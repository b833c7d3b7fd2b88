//! Provider-agnostic chat completion types and the `LlmProvider` trait.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    /// Map the OpenAI-style `finish_reason` string.
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            Some("stop") => Self::Stop,
            Some("length") => Self::Length,
            Some("content_filter") => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
    pub response_id: Option<String>,
}

/// A chat-completion capable language model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier sent to the provider.
    fn model_name(&self) -> &str;

    /// Price per input token and per output token, in USD.
    fn cost_per_token(&self) -> (Decimal, Decimal);

    /// Run a single chat completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Provider label used in errors and logs.
    fn provider_name(&self) -> &str {
        "llm"
    }
}

/// Run `request` against `llm`, giving up after `timeout`.
///
/// An elapsed timeout is reported as [`LlmError::Timeout`] so callers can
/// treat it like any other provider failure.
pub async fn complete_within(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
    timeout: Duration,
) -> Result<CompletionResponse, LlmError> {
    match tokio::time::timeout(timeout, llm.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            provider: llm.provider_name().to_string(),
            after: timeout,
        }),
    }
}

/// Estimated USD cost of a completed call.
pub fn estimate_cost(llm: &dyn LlmProvider, response: &CompletionResponse) -> Decimal {
    let (input, output) = llm.cost_per_token();
    input * Decimal::from(response.input_tokens) + output * Decimal::from(response.output_tokens)
}
