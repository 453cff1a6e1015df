//! Message domain types.
//!
//! A conversation is an ordered list of role-tagged messages. Besides the
//! usual chat roles, the tool-use protocol uses three "sub-roles" that never
//! reach the model directly: `tool` (an action request), `language` (the free
//! text the model produced in a turn) and `execute` (an action's result).
//! The protocol formatter folds them into the primitive roles.

use serde::{Deserialize, Serialize};

use crate::action::{ActionCall, ToolKind};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (meta prompt, tool descriptions)
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Feedback from the outside world (action results)
    Environment,
    /// An action request emitted by the model
    Tool,
    /// The free text the model produced in a turn
    Language,
    /// An action's result before protocol rendering
    Execute,
}

impl Role {
    /// Roles the model understands natively. Every other role is rewritten
    /// by the formatter.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Role::System | Role::User | Role::Assistant | Role::Environment
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Environment => "environment",
            Role::Tool => "tool",
            Role::Language => "language",
            Role::Execute => "execute",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message payload: plain text, or a structured action call.
///
/// Structured content only appears on `tool` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Action(ActionCall),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionCall> {
        match self {
            Content::Action(call) => Some(call),
            Content::Text(_) => None,
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<ActionCall> for Content {
    fn from(call: ActionCall) -> Self {
        Content::Action(call)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The payload
    pub content: Content,

    /// Sub-role tag, e.g. `plugin` / `interpreter` on system and tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a text message with an arbitrary role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(content.into()),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn environment(content: impl Into<String>) -> Self {
        Self::new(Role::Environment, content)
    }

    /// The free text the model produced in one turn.
    pub fn language(content: impl Into<String>) -> Self {
        Self::new(Role::Language, content)
    }

    /// An action request of the given kind.
    pub fn tool(kind: ToolKind, call: ActionCall) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Action(call),
            name: Some(kind.as_str().to_string()),
        }
    }

    /// Attach a sub-role name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The text payload, or an empty string for structured content.
    pub fn text(&self) -> &str {
        self.content.as_text().unwrap_or_default()
    }
}
