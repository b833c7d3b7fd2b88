//! Email → reply pipeline.
//!
//! Every inbound email flows through:
//! 1. `AgentSelector::select()`: pick a persona (never fails)
//! 2. `ResponseComposer::compose()`: grounded reply generation
//!
//! **No sending happens here.** The reply text is returned to the caller.

pub mod orchestrator;
pub mod types;

pub use orchestrator::{SupportPipeline, UNROUTABLE_REPLY};
pub use types::{GeneratedReply, InboundMessage};
