//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rig::OneOrMany;
use rig::completion::{
    AssistantContent, CompletionError, CompletionModel, CompletionRequest as RigRequest, Message,
};
use rig::http_client;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use super::costs::model_cost;
use super::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use crate::error::LlmError;

/// "Please try again in 7.5s" / "in 1m2.5s" / "in 350ms" in rate-limit bodies.
static TRY_AGAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"try again in (?:(\d+)m)?(\d+(?:\.\d+)?)(ms|s)\b").expect("valid regex")
});

/// Wraps a rig completion model as an [`LlmProvider`].
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            provider: provider.into(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> LlmError {
        LlmError::InvalidResponse {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.model_name)
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let request = to_rig_request(&self.provider, request)?;

        let response = self
            .model
            .completion(request)
            .await
            .map_err(|e| map_completion_error(&self.provider, e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect();
        if content.is_empty() {
            return Err(self.invalid("Empty content"));
        }

        // rig keeps the provider's own body; id and finish_reason only live there.
        let raw = serde_json::to_value(&response.raw_response).unwrap_or(Value::Null);
        let response_id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        let finish_reason = FinishReason::from_api(
            raw.pointer("/choices/0/finish_reason")
                .and_then(Value::as_str),
        );

        let input_tokens = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);

        tracing::debug!(
            provider = %self.provider,
            model = %self.model_name,
            input_tokens,
            output_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason,
            response_id,
        })
    }
}

/// Convert our request into rig's shape.
///
/// System messages become the preamble. `max_tokens` also goes out as an
/// extra body field because the chat-completions models do not forward it.
fn to_rig_request(provider: &str, request: CompletionRequest) -> Result<RigRequest, LlmError> {
    let mut system = Vec::new();
    let mut history = Vec::new();
    for message in request.messages {
        match message.role {
            Role::System => system.push(message.content),
            Role::User => history.push(Message::user(message.content)),
            Role::Assistant => history.push(Message::assistant(message.content)),
        }
    }

    let chat_history = OneOrMany::many(history).map_err(|_| LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: "Request has no user or assistant message".to_string(),
    })?;

    Ok(RigRequest {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        chat_history,
        documents: Vec::new(),
        tools: Vec::new(),
        temperature: request.temperature.map(f64::from),
        max_tokens: request.max_tokens.map(u64::from),
        tool_choice: None,
        additional_params: request.max_tokens.map(|n| json!({ "max_tokens": n })),
    })
}

/// Map a rig error to an `LlmError`.
///
/// Groq and OpenAI report a failed HTTP status as a `ProviderError` carrying
/// the response body, so auth and rate-limit failures are told apart by the
/// error codes in that body.
fn map_completion_error(provider: &str, err: CompletionError) -> LlmError {
    match err {
        CompletionError::HttpError(http_client::Error::InvalidStatusCode(status))
            if matches!(status.as_u16(), 401 | 403) =>
        {
            LlmError::AuthFailed {
                provider: provider.to_string(),
            }
        }
        CompletionError::HttpError(http_client::Error::InvalidStatusCode(status))
            if status.as_u16() == 429 =>
        {
            LlmError::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
            }
        }
        CompletionError::ProviderError(body) => classify_provider_error(provider, body),
        CompletionError::JsonError(e) => LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: e.to_string(),
        },
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason,
        },
        other => LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: other.to_string(),
        },
    }
}

fn classify_provider_error(provider: &str, body: String) -> LlmError {
    let lower = body.to_ascii_lowercase();
    if lower.contains("invalid_api_key")
        || lower.contains("invalid api key")
        || lower.contains("incorrect api key")
        || lower.contains("unauthorized")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else if lower.contains("rate_limit") || lower.contains("rate limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: retry_hint(&lower),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: body,
        }
    }
}

fn retry_hint(message: &str) -> Option<Duration> {
    let caps = TRY_AGAIN.captures(message)?;
    let minutes: f64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);
    let value: f64 = caps[2].parse().ok()?;
    let seconds = match &caps[3] {
        "ms" => value / 1000.0,
        _ => value,
    };
    Some(Duration::from_secs_f64(minutes * 60.0 + seconds))
}
