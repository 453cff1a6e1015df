//! # Roleplayer Protocol
//!
//! Turns a structured conversation into the flat prompt a model was trained
//! on, and turns the model's raw reply back into a typed action request.
//!
//! - [`Protocol::format`] builds the prompt: system head, few-shot examples,
//!   then the history with `tool` / `language` / `execute` sub-roles folded
//!   into primitive roles.
//! - [`Protocol::parse`] splits a reply into language and an optional
//!   plugin or interpreter action.
//! - [`Protocol::format_response`] renders an action result as a message.

pub mod builder;
pub mod config;
mod formatter;
mod parser;
mod protocol;
pub mod render;
mod response;
pub mod template;

pub use config::{ExecuteConfig, ProtocolConfig, RoleConfig, interpreter_prompt_for};
pub use parser::{ActionRequest, RequestedAction};
pub use protocol::Protocol;
