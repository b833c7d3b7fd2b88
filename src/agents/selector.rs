//! Agent selector: asks the model which registered agent fits a message.
//!
//! The model's answer is untrusted input: it is trimmed and matched exactly
//! (case-sensitive) against registry keys. Anything else, including any
//! provider failure or timeout, routes to the default agent.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::registry::{AgentDescriptor, AgentRegistry};
use crate::error::{LlmError, SelectionError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, complete_within};

/// Configuration for the classification call.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Greedy decoding by default.
    pub temperature: f32,
    /// An agent name is a handful of tokens.
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 32,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Subset of an agent shown to the classifier.
#[derive(Serialize)]
struct AgentSummary<'a> {
    name: &'a str,
    description: &'a str,
    skills: &'a [String],
}

/// Picks the best-fit agent for a piece of free text.
pub struct AgentSelector {
    llm: Arc<dyn LlmProvider>,
    registry: Arc<AgentRegistry>,
    config: SelectorConfig,
}

impl AgentSelector {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        registry: Arc<AgentRegistry>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            config,
        }
    }

    /// Select an agent, applying the fallback policy.
    ///
    /// Never fails: classification problems degrade to the default agent.
    /// Returns `None` only when no agent can be resolved at all.
    pub async fn select(&self, content: &str) -> Option<AgentDescriptor> {
        match self.classify(content).await {
            Ok(agent) => {
                info!(agent = %agent.name, "Selected agent");
                Some(agent)
            }
            Err(SelectionError::UnknownAgent(answer)) => {
                info!(answer = %answer, "No specific agent matched, using default agent");
                self.registry.resolve(&answer).await
            }
            Err(SelectionError::NoAgents) => {
                debug!("No named agents registered, using default agent");
                self.registry.default_agent().await
            }
            Err(e @ SelectionError::Llm(_)) => {
                warn!(error = %e, "Agent selection failed, using default agent");
                self.registry.default_agent().await
            }
        }
    }

    /// One classification round trip, reporting exactly why no registered
    /// agent was picked.
    pub async fn classify(&self, content: &str) -> Result<AgentDescriptor, SelectionError> {
        let agents = self.registry.agents().await;
        if agents.is_empty() {
            return Err(SelectionError::NoAgents);
        }

        let prompt = build_selection_prompt(content, &agents).map_err(LlmError::from)?;
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = complete_within(self.llm.as_ref(), request, self.config.timeout).await?;
        let answer = response.content.trim();
        debug!(answer = %answer, "Classifier answered");

        agents
            .into_iter()
            .find(|agent| agent.name == answer)
            .ok_or_else(|| SelectionError::UnknownAgent(answer.to_string()))
    }
}

/// Build the classification prompt listing every registered agent.
pub fn build_selection_prompt(
    content: &str,
    agents: &[AgentDescriptor],
) -> Result<String, serde_json::Error> {
    let summaries: Vec<AgentSummary<'_>> = agents
        .iter()
        .map(|a| AgentSummary {
            name: &a.name,
            description: &a.description,
            skills: &a.skills,
        })
        .collect();
    let listing = serde_json::to_string_pretty(&summaries)?;

    Ok(format!(
        "Based on the following query, select the best agent.\n\n\
         Query:\n{content}\n\n\
         Available agents:\n{listing}\n\n\
         Respond only with the exact name of the most appropriate agent."
    ))
}
