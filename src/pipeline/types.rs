//! Data crossing the pipeline boundary.

use serde::{Deserialize, Serialize};

/// The only data the pipeline consumes from mail ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub subject: String,
    pub body: String,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// The reply handed back to the HTTP / ticket layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
}

impl GeneratedReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
