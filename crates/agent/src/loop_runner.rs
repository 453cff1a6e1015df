//! The synchronous turn loop.

use std::sync::Arc;

use chrono::Utc;
use roleplayer_config::AppConfig;
use roleplayer_core::event::{DomainEvent, EventBus};
use roleplayer_core::{
    ActionExecutor, AgentReturn, AgentStatus, ChatRequest, Error, GenerationOptions, Message,
    ModelStatus, ProtocolError, Provider, Result, ToolKind,
};
use roleplayer_protocol::Protocol;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::dispatcher::{Dispatched, Dispatcher, SkipReason};

/// A tool-using agent that plays a character.
///
/// Each call formats the history, asks the model for the next turn, and runs
/// whatever action the model requested, feeding the result back until the
/// model answers without a tool, calls the finish action, or the turn budget
/// runs out.
#[derive(Clone)]
pub struct RoleplayerAgent {
    /// The LLM provider to use
    pub(crate) provider: Arc<dyn Provider>,

    /// Prompt markup, immutable once built
    pub(crate) protocol: Arc<Protocol>,

    /// Executors keyed by tool kind
    pub(crate) dispatcher: Dispatcher,

    /// Sampling parameters for every request
    pub(crate) options: GenerationOptions,

    /// Maximum model calls per call
    pub(crate) max_turn: usize,

    /// JSON pointer to the final answer inside the finish action's arguments
    pub(crate) finish_pointer: String,

    /// Event bus for domain events
    pub(crate) event_bus: Arc<EventBus>,
}

impl RoleplayerAgent {
    /// Create an agent with no executors and default settings.
    pub fn new(provider: Arc<dyn Provider>, protocol: Protocol) -> Self {
        Self {
            provider,
            protocol: Arc::new(protocol),
            dispatcher: Dispatcher::new(),
            options: GenerationOptions::default(),
            max_turn: 3,
            finish_pointer: "/response".into(),
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Build an agent from the application config. Executors are attached
    /// separately.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Result<Self> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let protocol = Protocol::new(config.effective_protocol())?;
        Ok(Self::new(provider, protocol)
            .with_options(config.generation.clone())
            .with_max_turn(config.agent.max_turn)
            .with_finish_pointer(config.agent.finish_response_pointer.clone()))
    }

    pub fn with_plugins(mut self, executor: ActionExecutor) -> Self {
        self.dispatcher = self
            .dispatcher
            .with_executor(ToolKind::Plugin, Arc::new(executor));
        self
    }

    pub fn with_interpreter(mut self, executor: ActionExecutor) -> Self {
        self.dispatcher = self
            .dispatcher
            .with_executor(ToolKind::Interpreter, Arc::new(executor));
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the turn budget. Values below one are raised to one.
    pub fn with_max_turn(mut self, max_turn: usize) -> Self {
        self.max_turn = max_turn.max(1);
        self
    }

    pub fn with_finish_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.finish_pointer = pointer.into();
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Run one call to completion.
    ///
    /// Skipped turns still count against the budget. A provider failure
    /// aborts the call.
    pub async fn chat(&self, history: &[Message]) -> Result<AgentReturn> {
        let session = Uuid::new_v4();
        info!(
            %session,
            provider = self.provider.name(),
            history = history.len(),
            max_turn = self.max_turn,
            "Starting chat"
        );

        let mut conversation = Conversation::new(history.to_vec());
        let mut ret = AgentReturn::default();
        let mut last_language = String::new();
        let mut finished = false;

        for turn in 1..=self.max_turn {
            ret.turns = turn;
            debug!(%session, turn, "Turn started");

            let request = self.request(&conversation)?;
            let raw = match self.provider.chat(request).await {
                Ok(raw) => raw,
                Err(e) => {
                    self.model_failed(ModelStatus::ServerErr, &e);
                    return Err(e.into());
                }
            };

            let parsed = self.protocol.parse(&raw, self.dispatcher.interpreter_action());
            let Some(action) = &parsed.action else {
                conversation.push(Message::language(&parsed.language));
                ret.response = parsed.language;
                finished = true;
                break;
            };

            last_language.clone_from(&parsed.language);
            let resolved = match self.dispatcher.resolve(action) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    self.skip(turn, &reason);
                    continue;
                }
            };

            let dispatched = resolved.execute(&parsed.language).await;
            self.action_executed(&dispatched);
            ret.actions.push(dispatched.ret.clone());
            conversation.push(Message::language(&parsed.language));

            if dispatched.finished {
                ret.response = parsed.language;
                finished = true;
                break;
            }

            self.feed_back(&mut conversation, dispatched);
        }

        if !finished {
            warn!(%session, max_turn = self.max_turn, "Turn budget exhausted");
            ret.response = last_language;
            ret.max_turn_reached = true;
        }

        ret.state = AgentStatus::End;
        ret.inner_steps = conversation.into_inner_steps();
        self.call_completed(&ret);
        info!(%session, turns = ret.turns, actions = ret.actions.len(), "Chat finished");
        Ok(ret)
    }

    /// Format the conversation into a provider request.
    pub(crate) fn request(
        &self,
        conversation: &Conversation,
    ) -> std::result::Result<ChatRequest, ProtocolError> {
        let messages = self.protocol.format(
            conversation.messages(),
            self.dispatcher.executor(ToolKind::Plugin),
            self.dispatcher.executor(ToolKind::Interpreter),
        )?;
        Ok(ChatRequest {
            messages,
            options: self.options.clone(),
        })
    }

    /// Append the action and its formatted result.
    pub(crate) fn feed_back(&self, conversation: &mut Conversation, dispatched: Dispatched) {
        let response = self.protocol.format_response(&dispatched.ret, dispatched.kind);
        conversation.push(Message::tool(dispatched.kind, dispatched.call));
        conversation.push(response);
    }

    pub(crate) fn skip(&self, turn: usize, reason: &SkipReason) {
        warn!(turn, %reason, "Skipping turn");
        self.event_bus.publish(DomainEvent::TurnSkipped {
            turn,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn action_executed(&self, dispatched: &Dispatched) {
        self.event_bus.publish(DomainEvent::ActionExecuted {
            kind: dispatched.kind,
            action: dispatched.ret.action_type.clone(),
            status: dispatched.ret.status,
            duration_ms: dispatched.duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn model_failed(&self, status: ModelStatus, error: &dyn std::fmt::Display) {
        warn!(status = status.code(), error = %error, "Model call failed");
        self.event_bus.publish(DomainEvent::ModelFailed {
            status: status.code(),
            message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn call_completed(&self, ret: &AgentReturn) {
        self.event_bus.publish(DomainEvent::CallCompleted {
            turns: ret.turns,
            actions: ret.actions.len(),
            timestamp: Utc::now(),
        });
    }
}
