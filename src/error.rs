//! Error types for the support desk.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Knowledge base error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} did not answer within {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mailbox (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Could not connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {user}")]
    Auth { user: String },

    #[error("IMAP command {command} failed: {response}")]
    Command { command: String, response: String },

    #[error("Malformed IMAP response: {0}")]
    Protocol(String),

    #[error("Mailbox is not configured (set EMAIL_USER and EMAIL_PASSWORD)")]
    NotConfigured,

    #[error("Mailbox task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Knowledge base errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Invalid document name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the selector could not pick a registered agent.
///
/// Never leaves the selector: it is turned into the default-agent fallback.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Classification call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model answered with unregistered agent {0:?}")]
    UnknownAgent(String),

    #[error("No agents registered")]
    NoAgents,
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Reply generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
