//! Support Desk: routes inbound support email to an agent persona and
//! drafts a reply grounded in a small knowledge base.

pub mod agents;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod server;
