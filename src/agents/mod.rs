//! Agent personas: registry, model-backed selection, and reply composition.

pub mod composer;
pub mod registry;
pub mod selector;

pub use composer::{ComposerConfig, ResponseComposer};
pub use registry::{AgentDescriptor, AgentRegistry};
pub use selector::{AgentSelector, SelectorConfig};
