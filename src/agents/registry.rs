//! Registry of support agent personas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A support specialty the selector can route to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Registry key. Matched exactly (case-sensitive) against model output.
    pub name: String,
    /// Persona summary, used verbatim in prompts.
    pub description: String,
    pub skills: Vec<String>,
    /// Reserved for per-agent context. Currently always empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, skills: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            context: String::new(),
        }
    }
}

/// Named agents plus one designated default.
///
/// Read-mostly: built at startup and shared behind an `Arc`.
pub struct AgentRegistry {
    agents: RwLock<BTreeMap<String, AgentDescriptor>>,
    default: RwLock<Option<AgentDescriptor>>,
}

impl AgentRegistry {
    /// Create a registry with no agents and no default.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(BTreeMap::new()),
            default: RwLock::new(None),
        }
    }

    /// The stock support desk: a general customer service default plus
    /// technical support and sales specialists.
    pub async fn support_defaults() -> Self {
        let registry = Self::new();
        registry
            .set_default(AgentDescriptor::new(
                "customer_service",
                "general customer service specialist",
                &["customer service", "general inquiries", "basic assistance"],
            ))
            .await;
        registry
            .register(AgentDescriptor::new(
                "technical_support",
                "specialist in resolving technical issues",
                &["troubleshooting", "configuration", "technical problems"],
            ))
            .await;
        registry
            .register(AgentDescriptor::new(
                "sales",
                "specialist in sales and product inquiries",
                &["products", "pricing", "promotions"],
            ))
            .await;
        registry
    }

    /// Add or replace an agent. Last write wins.
    pub async fn register(&self, agent: AgentDescriptor) {
        tracing::debug!(agent = %agent.name, skills = ?agent.skills, "Registered agent");
        self.agents.write().await.insert(agent.name.clone(), agent);
    }

    /// Replace the default agent.
    pub async fn set_default(&self, agent: AgentDescriptor) {
        tracing::debug!(agent = %agent.name, "Default agent configured");
        *self.default.write().await = Some(agent);
    }

    /// Exact lookup, no fallback.
    pub async fn get(&self, name: &str) -> Option<AgentDescriptor> {
        self.agents.read().await.get(name).cloned()
    }

    /// Look up `name`, degrading to the default agent when it is unknown.
    ///
    /// `None` only when the name is unknown and no default was ever set.
    pub async fn resolve(&self, name: &str) -> Option<AgentDescriptor> {
        if let Some(agent) = self.get(name).await {
            return Some(agent);
        }
        self.default_agent().await
    }

    pub async fn default_agent(&self) -> Option<AgentDescriptor> {
        self.default.read().await.clone()
    }

    /// All named agents, ordered by name.
    pub async fn agents(&self) -> Vec<AgentDescriptor> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billing() -> AgentDescriptor {
        AgentDescriptor::new("billing", "billing specialist", &["invoices", "payments"])
    }

    #[tokio::test]
    async fn resolve_known_name() {
        let registry = AgentRegistry::support_defaults().await;
        let agent = registry.resolve("sales").await.unwrap();
        assert_eq!(agent.description, "specialist in sales and product inquiries");
    }

    #[tokio::test]
    async fn resolve_unknown_name_returns_default() {
        let registry = AgentRegistry::support_defaults().await;
        for name in ["", "billing", "Sales", "sales ", "technical support"] {
            let agent = registry.resolve(name).await.unwrap();
            assert_eq!(agent.name, "customer_service", "name {name:?}");
        }
    }

    #[tokio::test]
    async fn resolve_without_default_is_none() {
        let registry = AgentRegistry::new();
        assert!(registry.resolve("anything").await.is_none());

        registry.register(billing()).await;
        assert!(registry.resolve("billing").await.is_some());
        assert!(registry.resolve("sales").await.is_none());
    }

    #[tokio::test]
    async fn register_is_last_write_wins() {
        let registry = AgentRegistry::new();
        registry.register(billing()).await;
        registry
            .register(AgentDescriptor::new("billing", "accounts receivable", &[]))
            .await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(
            registry.get("billing").await.unwrap().description,
            "accounts receivable"
        );
    }

    #[tokio::test]
    async fn default_is_not_listed_as_named_agent() {
        let registry = AgentRegistry::support_defaults().await;
        let names: Vec<String> = registry.agents().await.into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["sales", "technical_support"]);
        assert!(registry.get("customer_service").await.is_none());
    }

    #[tokio::test]
    async fn set_default_replaces() {
        let registry = AgentRegistry::support_defaults().await;
        registry.set_default(billing()).await;
        assert_eq!(registry.resolve("nope").await.unwrap().name, "billing");
    }

    #[test]
    fn empty_context_is_not_serialized() {
        let json = serde_json::to_string(&billing()).unwrap();
        assert!(!json.contains("context"));
    }
}
