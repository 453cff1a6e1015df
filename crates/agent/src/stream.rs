//! The streaming turn loop.
//!
//! A spawned task owns the conversation and the running [`AgentReturn`]; the
//! caller receives immutable snapshots over a bounded channel:
//!
//! - `StreamIng` while the model writes plain text
//! - `PluginStart` / `Coding` once an action marker shows up
//! - `PluginEnd` / `CodeEnd` when the model finishes and the action is about
//!   to run
//! - `PluginReturn` / `CodeReturn` after the result has been fed back
//! - `End` once the call is over, carrying the inner steps
//!
//! Whenever the inferred state changes, an extra snapshot with the previous
//! state and the language so far is sent first. A negative model status ends
//! the call with the mirrored failure state.

use roleplayer_core::{AgentReturn, AgentStatus, Message, ModelStatus, StreamChunk};
use roleplayer_protocol::{ActionRequest, RequestedAction};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::loop_runner::RoleplayerAgent;

const SNAPSHOT_BUFFER: usize = 64;

impl RoleplayerAgent {
    /// Run one call, streaming a snapshot after every model update.
    ///
    /// Dropping the stream stops the call at its next snapshot.
    pub fn stream_chat(&self, history: &[Message]) -> ReceiverStream<AgentReturn> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let mut run = StreamRun {
            agent: self.clone(),
            tx,
            conversation: Conversation::new(history.to_vec()),
            ret: AgentReturn::default(),
            session: Uuid::new_v4(),
        };

        tokio::spawn(async move {
            if run.drive().await.is_err() {
                debug!(session = %run.session, "Snapshot receiver dropped, stopping");
            }
        });

        ReceiverStream::new(rx)
    }
}

/// The receiver is gone.
struct Closed;

struct StreamRun {
    agent: RoleplayerAgent,
    tx: mpsc::Sender<AgentReturn>,
    conversation: Conversation,
    ret: AgentReturn,
    session: Uuid,
}

impl StreamRun {
    async fn drive(&mut self) -> Result<(), Closed> {
        let agent = self.agent.clone();
        info!(session = %self.session, max_turn = agent.max_turn, "Starting stream chat");

        let mut last_language = String::new();
        let mut finished = false;

        for turn in 1..=agent.max_turn {
            self.ret.turns = turn;
            debug!(session = %self.session, turn, "Turn started");

            let request = match agent.request(&self.conversation) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Cannot format history");
                    return self.fail(AgentStatus::SessionInvalidArg, e.to_string()).await;
                }
            };
            let mut chunks = match agent.provider.stream_chat(request).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    agent.model_failed(ModelStatus::ServerErr, &e);
                    return self.fail(AgentStatus::ServerErr, e.to_string()).await;
                }
            };

            let mut state = AgentStatus::StreamIng;
            let mut parsed: Option<ActionRequest> = None;
            while let Some(chunk) = chunks.recv().await {
                if chunk.status.is_error() {
                    let message = chunk_error(&chunk);
                    agent.model_failed(chunk.status, &message);
                    return self.fail(chunk.status.into(), message).await;
                }

                let request = agent
                    .protocol
                    .parse(&chunk.text, agent.dispatcher.interpreter_action());
                state = self.partial(state, &request).await?;
                parsed = Some(request);

                if chunk.status == ModelStatus::End {
                    break;
                }
            }

            let parsed = parsed.unwrap_or_else(|| ActionRequest {
                kind: None,
                language: String::new(),
                action: None,
            });

            let Some(action) = &parsed.action else {
                self.conversation.push(Message::language(&parsed.language));
                self.ret.response = parsed.language;
                finished = true;
                break;
            };

            last_language.clone_from(&parsed.language);
            let resolved = match agent.dispatcher.resolve(action) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    agent.skip(turn, &reason);
                    continue;
                }
            };

            let kind = resolved.kind;
            self.ret.state = AgentStatus::ended(kind);
            self.snapshot().await?;

            let dispatched = resolved.execute(&parsed.language).await;
            agent.action_executed(&dispatched);
            self.ret.actions.push(dispatched.ret.clone());
            self.conversation.push(Message::language(&parsed.language));

            if dispatched.finished {
                self.ret.response = finish_response(&dispatched.ret.args, &agent.finish_pointer);
                finished = true;
                break;
            }

            agent.feed_back(&mut self.conversation, dispatched);
            self.ret.state = AgentStatus::returned(kind);
            self.snapshot().await?;
        }

        if !finished {
            warn!(session = %self.session, max_turn = agent.max_turn, "Turn budget exhausted");
            self.ret.response = last_language;
            self.ret.max_turn_reached = true;
        }

        self.ret.state = AgentStatus::End;
        self.ret.inner_steps = self.conversation.inner_steps().to_vec();
        agent.call_completed(&self.ret);
        info!(session = %self.session, turns = self.ret.turns, "Stream chat finished");
        self.snapshot().await
    }

    /// Emit the snapshots for one partial model update and return the new
    /// state.
    async fn partial(
        &mut self,
        last: AgentStatus,
        request: &ActionRequest,
    ) -> Result<AgentStatus, Closed> {
        let state = match &request.action {
            Some(action) => AgentStatus::started(action.kind()),
            None => AgentStatus::StreamIng,
        };

        if state != last {
            self.ret.state = last;
            self.ret.response = request.language.clone();
            self.snapshot().await?;
        }

        self.ret.state = state;
        self.ret.response = match &request.action {
            Some(action) => action_text(action),
            None => request.language.clone(),
        };
        self.snapshot().await?;
        Ok(state)
    }

    /// End the call with a failure state.
    async fn fail(&mut self, state: AgentStatus, errmsg: String) -> Result<(), Closed> {
        self.ret.state = state;
        self.ret.errmsg = Some(errmsg);
        self.ret.inner_steps = self.conversation.inner_steps().to_vec();
        self.snapshot().await
    }

    async fn snapshot(&self) -> Result<(), Closed> {
        self.tx.send(self.ret.clone()).await.map_err(|_| Closed)
    }
}

/// What a partial action looks like to the caller.
fn action_text(action: &RequestedAction) -> String {
    match action {
        RequestedAction::Plugin(raw) => raw.clone(),
        RequestedAction::Interpreter(call) => call.command_text().unwrap_or_default().to_string(),
    }
}

fn chunk_error(chunk: &StreamChunk) -> String {
    chunk
        .meta
        .as_ref()
        .and_then(|meta| meta.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("model reported status {}", chunk.status.code()))
}

/// Read the final answer out of the finish action's arguments.
fn finish_response(args: &Value, pointer: &str) -> String {
    match args.pointer(pointer) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => {
            warn!(pointer, "Unable to read the finish action's response");
            String::new()
        }
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use roleplayer_core::{ActionExecutor, FINISH_ACTION, ProviderError, Role, ToolKind};
    use roleplayer_protocol::Protocol;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::test_helpers::{
        EchoCode, ScriptedStreamProvider, finish_call, interpreter_call, plugin_call,
        plugin_executor, streamed,
    };

    fn agent(provider: ScriptedStreamProvider) -> RoleplayerAgent {
        RoleplayerAgent::new(Arc::new(provider), Protocol::default())
            .with_plugins(plugin_executor())
            .with_interpreter(ActionExecutor::new().with_action(Box::new(EchoCode)))
    }

    async fn collect(agent: &RoleplayerAgent, history: &[Message]) -> Vec<AgentReturn> {
        agent.stream_chat(history).collect().await
    }

    fn states(snapshots: &[AgentReturn]) -> Vec<AgentStatus> {
        snapshots.iter().map(|s| s.state).collect()
    }

    #[tokio::test]
    async fn plain_text_streams_then_ends() {
        let provider = ScriptedStreamProvider::new(vec![streamed(&["Well", "Well met", "Well met."])]);
        let snapshots = collect(&agent(provider), &[Message::user("Hi")]).await;

        assert_eq!(
            states(&snapshots),
            vec![
                AgentStatus::StreamIng,
                AgentStatus::StreamIng,
                AgentStatus::StreamIng,
                AgentStatus::End
            ]
        );
        assert_eq!(snapshots[1].response, "Well met");
        let last = snapshots.last().unwrap();
        assert_eq!(last.response, "Well met.");
        assert_eq!(last.inner_steps, vec![Message::language("Well met.")]);
        assert_eq!(last.turns, 1);
    }

    #[tokio::test]
    async fn plugin_turn_walks_through_states() {
        let call = plugin_call(
            "Rolling. ",
            "Calculator.evaluate",
            serde_json::json!({"expression": "2+2"}),
        );
        let provider = ScriptedStreamProvider::new(vec![
            streamed(&["Rolling. ", call.as_str()]),
            streamed(&["Four."]),
        ]);
        let snapshots = collect(&agent(provider), &[]).await;

        assert_eq!(
            states(&snapshots),
            vec![
                AgentStatus::StreamIng,
                // language flushed under the old state
                AgentStatus::StreamIng,
                AgentStatus::PluginStart,
                AgentStatus::PluginEnd,
                AgentStatus::PluginReturn,
                AgentStatus::StreamIng,
                AgentStatus::End,
            ]
        );
        assert_eq!(snapshots[1].response, "Rolling. ");
        assert!(snapshots[2].response.contains("Calculator.evaluate"));
        assert_eq!(snapshots[4].actions.len(), 1);
        assert_eq!(snapshots[4].actions[0].format_result(), "4");

        let last = snapshots.last().unwrap();
        assert_eq!(last.response, "Four.");
        assert_eq!(last.turns, 2);
        let roles: Vec<Role> = last.inner_steps.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Language, Role::Tool, Role::Environment, Role::Language]
        );
    }

    #[tokio::test]
    async fn interpreter_turn_uses_coding_states() {
        let provider = ScriptedStreamProvider::new(vec![
            streamed(&[interpreter_call("", "print(3)").as_str()]),
            streamed(&["Three."]),
        ]);
        let snapshots = collect(&agent(provider), &[]).await;
        let states = states(&snapshots);

        assert!(states.contains(&AgentStatus::Coding));
        assert!(states.contains(&AgentStatus::CodeEnd));
        assert!(states.contains(&AgentStatus::CodeReturn));
        let coding = snapshots
            .iter()
            .find(|s| s.state == AgentStatus::Coding)
            .unwrap();
        assert_eq!(coding.response, "print(3)");
    }

    #[tokio::test]
    async fn finish_response_comes_from_pointer() {
        let provider = ScriptedStreamProvider::new(vec![streamed(&[finish_call(
            "Closing the book. ",
            "The end.",
        )
        .as_str()])]);
        let snapshots = collect(&agent(provider), &[]).await;

        let last = snapshots.last().unwrap();
        assert_eq!(last.state, AgentStatus::End);
        assert_eq!(last.response, "The end.");
        assert_eq!(last.actions[0].action_type, FINISH_ACTION);
        assert!(!states(&snapshots).contains(&AgentStatus::PluginReturn));
    }

    #[tokio::test]
    async fn custom_pointer_missing_gives_empty_response() {
        let provider =
            ScriptedStreamProvider::new(vec![streamed(&[finish_call("", "The end.").as_str()])]);
        let snapshots = collect(&agent(provider).with_finish_pointer("/answer"), &[]).await;
        assert_eq!(snapshots.last().unwrap().response, "");
    }

    #[tokio::test]
    async fn model_failure_mirrors_status() {
        let provider = ScriptedStreamProvider::new(vec![vec![
            StreamChunk::new(ModelStatus::StreamIng, "Once upon"),
            StreamChunk {
                status: ModelStatus::SessionOutOfLimit,
                text: String::new(),
                meta: Some(serde_json::json!({"error": "context too long"})),
            },
        ]]);
        let snapshots = collect(&agent(provider), &[]).await;

        let last = snapshots.last().unwrap();
        assert_eq!(last.state, AgentStatus::SessionOutOfLimit);
        assert_eq!(last.errmsg.as_deref(), Some("context too long"));
        assert_eq!(snapshots.len(), 2);
    }

    #[tokio::test]
    async fn provider_error_becomes_server_error_snapshot() {
        let provider = ScriptedStreamProvider::failing(ProviderError::Network("refused".into()));
        let snapshots = collect(&agent(provider), &[]).await;

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, AgentStatus::ServerErr);
        assert!(snapshots[0].errmsg.as_deref().unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn budget_exhaustion_in_stream() {
        let turn = || streamed(&[interpreter_call("Again. ", "x").as_str()]);
        let provider = ScriptedStreamProvider::new(vec![turn(), turn()]);
        let snapshots = collect(&agent(provider).with_max_turn(2), &[]).await;

        let last = snapshots.last().unwrap();
        assert_eq!(last.state, AgentStatus::End);
        assert!(last.max_turn_reached);
        assert_eq!(last.turns, 2);
        assert_eq!(last.response, "Again. ");
        assert_eq!(last.actions.len(), 2);
    }

    #[tokio::test]
    async fn skipped_final_stream_turn_keeps_its_language() {
        let provider = ScriptedStreamProvider::new(vec![
            streamed(&[interpreter_call("First. ", "x").as_str()]),
            streamed(&["Second. <|action_start|><|plugin|>\n{not json}<|action_end|>\n"]),
        ]);
        let snapshots = collect(&agent(provider).with_max_turn(2), &[]).await;

        let last = snapshots.last().unwrap();
        assert!(last.max_turn_reached);
        assert_eq!(last.actions.len(), 1);
        assert_eq!(last.response, "Second. ");
    }

    #[tokio::test]
    async fn missing_executor_skips_stream_turn() {
        let provider = ScriptedStreamProvider::new(vec![
            streamed(&[interpreter_call("", "print(1)").as_str()]),
            streamed(&["Fine."]),
        ]);
        let agent = RoleplayerAgent::new(Arc::new(provider), Protocol::default())
            .with_plugins(plugin_executor());
        let snapshots = collect(&agent, &[]).await;

        let states = states(&snapshots);
        assert!(!states.contains(&AgentStatus::CodeEnd));
        let last = snapshots.last().unwrap();
        assert_eq!(last.response, "Fine.");
        assert!(last.actions.is_empty());
        assert_eq!(last.inner_steps.len(), 1);
    }

    #[tokio::test]
    async fn malformed_history_is_invalid_argument() {
        let provider = ScriptedStreamProvider::new(vec![]);
        let history = vec![Message::tool(
            ToolKind::Plugin,
            roleplayer_core::ActionCall::new("x", serde_json::json!({})),
        )
        .with_name("browser")];
        let snapshots = collect(&agent(provider), &history).await;

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, AgentStatus::SessionInvalidArg);
    }
}
