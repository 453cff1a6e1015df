//! Routes a parsed action request to the executor bound to its tool kind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use roleplayer_core::{ActionCall, ActionExecutor, ActionReturn, ToolKind};
use roleplayer_protocol::RequestedAction;
use tracing::debug;

/// Why a turn's action was dropped without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No executor is bound to the requested tool kind
    MissingExecutor(ToolKind),
    /// The plugin call is not a JSON `{name, parameters}` object
    MalformedAction(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingExecutor(kind) => write!(f, "no {kind} executor is configured"),
            SkipReason::MalformedAction(reason) => write!(f, "invalid action: {reason}"),
        }
    }
}

/// The dispatch table, fixed at construction.
#[derive(Clone, Default)]
pub struct Dispatcher {
    executors: BTreeMap<ToolKind, Arc<ActionExecutor>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `executor` to `kind`, replacing any earlier binding.
    pub fn with_executor(mut self, kind: ToolKind, executor: Arc<ActionExecutor>) -> Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn executor(&self, kind: ToolKind) -> Option<&ActionExecutor> {
        self.executors.get(&kind).map(Arc::as_ref)
    }

    /// The action interpreter requests are addressed to: the first action
    /// of the interpreter executor.
    pub fn interpreter_action(&self) -> Option<&str> {
        self.executor(ToolKind::Interpreter)
            .and_then(|executor| executor.action_names().first().copied())
    }

    /// Pick the executor for `action` and decode its call.
    pub fn resolve(&self, action: &RequestedAction) -> Result<Resolved<'_>, SkipReason> {
        let kind = action.kind();
        let executor = self
            .executor(kind)
            .ok_or(SkipReason::MissingExecutor(kind))?;

        let call = match action {
            RequestedAction::Plugin(raw) => serde_json::from_str::<ActionCall>(raw)
                .map_err(|e| SkipReason::MalformedAction(e.to_string()))?,
            RequestedAction::Interpreter(call) => call.clone(),
        };

        Ok(Resolved {
            kind,
            call,
            executor,
        })
    }
}

/// An action ready to run.
pub struct Resolved<'a> {
    pub kind: ToolKind,
    pub call: ActionCall,
    executor: &'a ActionExecutor,
}

impl Resolved<'_> {
    /// Run the action, recording `language` as its thought.
    pub async fn execute(self, language: &str) -> Dispatched {
        let started = Instant::now();
        let mut ret = self
            .executor
            .invoke(&self.call.name, self.call.parameters.clone())
            .await;
        ret.thought = language.to_string();

        let finished = ret.action_type == self.executor.finish_action_name();
        debug!(
            kind = %self.kind,
            action = %ret.action_type,
            status = ?ret.status,
            finished,
            "Action dispatched"
        );

        Dispatched {
            kind: self.kind,
            call: self.call,
            ret,
            finished,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// The outcome of one dispatched action.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub kind: ToolKind,
    pub call: ActionCall,
    pub ret: ActionReturn,
    /// The model called the executor's finish action
    pub finished: bool,
    pub duration_ms: u64,
}
