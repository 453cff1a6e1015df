//! Shared test helpers for turn loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use roleplayer_core::{
    Action, ActionError, ActionExecutor, ChatRequest, FINISH_ACTION, ModelStatus, Provider,
    ProviderError, ResultItem, StreamChunk,
};
use roleplayer_tools::{Calculator, Dice};
use serde_json::Value;
use tokio::sync::mpsc;

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `chat` returns the next reply in the queue.
/// Panics if more calls are made than replies provided.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose first call fails.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The request sent on call `index` (zero-based).
    pub fn request(&self, index: usize) -> ChatRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedProvider: no more replies (call #{})", requests.len())
        })
    }
}

/// A mock provider that streams one scripted chunk list per call.
pub struct ScriptedStreamProvider {
    turns: Mutex<VecDeque<Result<Vec<StreamChunk>, ProviderError>>>,
}

impl ScriptedStreamProvider {
    pub fn new(turns: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            turns: Mutex::new(VecDeque::from([Err(error)])),
        }
    }

    fn next_turn(&self) -> Result<Vec<StreamChunk>, ProviderError> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedStreamProvider: no more turns")
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted_stream"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<String, ProviderError> {
        let chunks = self.next_turn()?;
        Ok(chunks.last().map(|c| c.text.clone()).unwrap_or_default())
    }

    async fn stream_chat(
        &self,
        _request: ChatRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let chunks = self.next_turn()?;
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            tx.send(chunk).await.unwrap();
        }
        Ok(rx)
    }
}

/// Cumulative snapshots: every text is `StreamIng` except the last, which is
/// `End`.
pub fn streamed(texts: &[&str]) -> Vec<StreamChunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let status = if i + 1 == texts.len() {
                ModelStatus::End
            } else {
                ModelStatus::StreamIng
            };
            StreamChunk::new(status, *text)
        })
        .collect()
}

/// Raw model output requesting a plugin in the default markup.
pub fn plugin_call(language: &str, name: &str, parameters: Value) -> String {
    let call = serde_json::json!({"name": name, "parameters": parameters});
    format!("{language}<|action_start|><|plugin|>\n{call}<|action_end|>\n")
}

/// Raw model output requesting the interpreter in the default markup.
pub fn interpreter_call(language: &str, code: &str) -> String {
    format!("{language}<|action_start|><|interpreter|>\n{code}\n<|action_end|>\n")
}

pub fn finish_call(language: &str, response: &str) -> String {
    plugin_call(
        language,
        FINISH_ACTION,
        serde_json::json!({"response": response}),
    )
}

/// Calculator plus a seeded dice roller.
pub fn plugin_executor() -> ActionExecutor {
    ActionExecutor::new()
        .with_action(Box::new(Calculator))
        .with_action(Box::new(Dice::seeded(7)))
}

/// Interpreter stand-in that echoes the code it was given.
pub struct EchoCode;

impl EchoCode {
    pub const NAME: &'static str = "EchoInterpreter";
}

#[async_trait]
impl Action for EchoCode {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Echoes the code it is given."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!([{"name": "command", "type": "STRING"}])
    }

    async fn run(&self, parameters: Value) -> Result<Vec<ResultItem>, ActionError> {
        let code = parameters
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidArguments("missing 'command'".into()))?;
        Ok(vec![ResultItem::text(format!("ran: {code}"))])
    }
}
