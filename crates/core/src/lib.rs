//! # Roleplayer Core
//!
//! Domain types, traits, and error definitions for the Roleplayer tool-use
//! agent. This crate has **zero framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the model, the actions) is a trait here.
//! Implementations live in their respective crates, so the protocol and the
//! turn loop can be tested against scripted stand-ins.

pub mod action;
pub mod agent;
pub mod error;
pub mod event;
pub mod executor;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use action::{
    ActionCall, ActionDescriptor, ActionReturn, ActionStatus, ResultItem, ResultKind, ToolKind,
};
pub use agent::{AgentReturn, AgentStatus};
pub use error::{ActionError, Error, ProtocolError, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use executor::{Action, ActionExecutor, FINISH_ACTION, NO_ACTION};
pub use message::{Content, Message, Role};
pub use provider::{ChatRequest, GenerationOptions, ModelStatus, Provider, StreamChunk};
