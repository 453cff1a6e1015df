//! Agent status and per-call return types.

use serde::{Deserialize, Serialize};

use crate::action::{ActionReturn, ToolKind};
use crate::message::Message;
use crate::provider::ModelStatus;

/// Where an agent call currently stands.
///
/// The error states mirror the model's stream status one-to-one; the
/// positive states refine "streaming" by what the model is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    End,
    /// Streaming plain language
    StreamIng,
    SessionReady,
    /// The model started writing a plugin call
    PluginStart,
    /// The plugin call is complete
    PluginEnd,
    /// The plugin's result is in the history
    PluginReturn,
    /// The model started writing interpreter code
    Coding,
    /// The code block is complete
    CodeEnd,
    /// The interpreter's result is in the history
    CodeReturn,
    ServerErr,
    SessionClosed,
    SessionOutOfLimit,
    SessionInvalidArg,
}

impl AgentStatus {
    pub fn code(self) -> i32 {
        match self {
            AgentStatus::End => 0,
            AgentStatus::StreamIng => 1,
            AgentStatus::SessionReady => 2,
            AgentStatus::PluginStart => 3,
            AgentStatus::PluginEnd => 4,
            AgentStatus::PluginReturn => 5,
            AgentStatus::Coding => 6,
            AgentStatus::CodeEnd => 7,
            AgentStatus::CodeReturn => 8,
            AgentStatus::ServerErr => -1,
            AgentStatus::SessionClosed => -2,
            AgentStatus::SessionOutOfLimit => -3,
            AgentStatus::SessionInvalidArg => -4,
        }
    }

    pub fn is_error(self) -> bool {
        self.code() < 0
    }

    /// The model is writing an action of this kind.
    pub fn started(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Plugin => AgentStatus::PluginStart,
            ToolKind::Interpreter => AgentStatus::Coding,
        }
    }

    /// The action request of this kind is complete.
    pub fn ended(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Plugin => AgentStatus::PluginEnd,
            ToolKind::Interpreter => AgentStatus::CodeEnd,
        }
    }

    /// The action of this kind has run and its result was recorded.
    pub fn returned(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Plugin => AgentStatus::PluginReturn,
            ToolKind::Interpreter => AgentStatus::CodeReturn,
        }
    }
}

impl From<ModelStatus> for AgentStatus {
    fn from(status: ModelStatus) -> Self {
        match status {
            ModelStatus::End => AgentStatus::End,
            ModelStatus::StreamIng => AgentStatus::StreamIng,
            ModelStatus::SessionReady => AgentStatus::SessionReady,
            ModelStatus::ServerErr => AgentStatus::ServerErr,
            ModelStatus::SessionClosed => AgentStatus::SessionClosed,
            ModelStatus::SessionOutOfLimit => AgentStatus::SessionOutOfLimit,
            ModelStatus::SessionInvalidArg => AgentStatus::SessionInvalidArg,
        }
    }
}

/// The output of one `chat` call, or one snapshot of a `stream_chat` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReturn {
    /// Final answer, or the partial text/action while streaming
    pub response: String,

    pub state: AgentStatus,

    /// Every action that ran during the call, in order
    #[serde(default)]
    pub actions: Vec<ActionReturn>,

    /// Messages generated during the call
    #[serde(default)]
    pub inner_steps: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,

    /// Model calls made
    #[serde(default)]
    pub turns: usize,

    /// The loop stopped because it ran out of turns, not because the model
    /// finished
    #[serde(default)]
    pub max_turn_reached: bool,
}
