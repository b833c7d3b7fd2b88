//! Support pipeline: routes an email to an agent and drafts the reply.
//!
//! Fallback chain:
//! 1. The selector picks a registered agent
//! 2. Any classification problem → the default agent
//! 3. No default agent → fixed "could not determine" reply, no generation call

use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::types::{GeneratedReply, InboundMessage};
use crate::agents::{AgentSelector, ResponseComposer};
use crate::error::PipelineError;
use crate::knowledge::KnowledgeBase;

/// Reply used when no agent (not even a default) can be resolved.
pub const UNROUTABLE_REPLY: &str = "Could not determine the appropriate department for this query.";

/// Sequences selection and composition for one inbound email.
///
/// Holds no per-call state; safe to share across concurrent requests.
pub struct SupportPipeline {
    selector: AgentSelector,
    composer: ResponseComposer,
    knowledge: Arc<KnowledgeBase>,
}

impl SupportPipeline {
    pub fn new(
        selector: AgentSelector,
        composer: ResponseComposer,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            selector,
            composer,
            knowledge,
        }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Draft a reply for an email with `subject` and `body`.
    pub async fn process_query(
        &self,
        subject: &str,
        body: &str,
    ) -> Result<GeneratedReply, PipelineError> {
        let span = info_span!("process_query", request_id = %Uuid::new_v4());
        self.run(subject, body).instrument(span).await
    }

    async fn run(&self, subject: &str, body: &str) -> Result<GeneratedReply, PipelineError> {
        info!(subject = %subject, "Processing email");

        // Routing looks at the body only.
        let Some(agent) = self.selector.select(body).await else {
            warn!("No agent could be resolved for this query");
            return Ok(GeneratedReply::new(UNROUTABLE_REPLY));
        };

        let knowledge = self.knowledge.documents().await;
        let text = self
            .composer
            .compose(subject, body, &agent, &knowledge)
            .await?;

        info!(agent = %agent.name, reply_len = text.len(), "Reply generated");
        Ok(GeneratedReply::new(text))
    }

    /// Convenience wrapper over [`Self::process_query`].
    pub async fn process(&self, message: &InboundMessage) -> Result<GeneratedReply, PipelineError> {
        self.process_query(&message.subject, &message.body).await
    }
}
