//! Action trait and executor, the abstraction over agent capabilities.
//!
//! An `ActionExecutor` owns a set of actions and answers every call with an
//! `ActionReturn`, never with an error: failures inside an action become a
//! failed return that the model gets to read on its next turn.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{ActionDescriptor, ActionReturn, ActionStatus, ResultItem};
use crate::error::ActionError;

/// Name of the built-in action that ends a conversation.
pub const FINISH_ACTION: &str = "FinishAction";

/// Name of the built-in action used when the model asks for nothing usable.
pub const NO_ACTION: &str = "NoAction";

/// The core Action trait.
///
/// Each plugin or interpreter implements this trait and is registered in an
/// `ActionExecutor`.
#[async_trait]
pub trait Action: Send + Sync {
    /// The unique name of this action (e.g. `"Calculator.evaluate"`).
    fn name(&self) -> &str;

    /// A description of what this action does (shown to the model).
    fn description(&self) -> &str;

    /// JSON description of the parameters.
    fn parameters_schema(&self) -> Value;

    /// Names of the parameters that must be present.
    fn required(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run the action.
    async fn run(&self, parameters: Value) -> Result<Vec<ResultItem>, ActionError>;

    fn to_descriptor(&self) -> ActionDescriptor {
        ActionDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            required: self.required(),
        }
    }
}

/// An ordered registry of actions plus the built-in finish action.
///
/// Registration order is significant: the formatter lists actions in this
/// order, and an interpreter executor is addressed through its first action.
pub struct ActionExecutor {
    actions: Vec<Box<dyn Action>>,
    finish_action: String,
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            finish_action: FINISH_ACTION.to_string(),
        }
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: Box<dyn Action>) {
        let name = action.name().to_string();
        self.actions.retain(|a| a.name() != name);
        self.actions.push(action);
    }

    pub fn with_action(mut self, action: Box<dyn Action>) -> Self {
        self.register(action);
        self
    }

    /// Rename the finish action.
    pub fn with_finish_action(mut self, name: impl Into<String>) -> Self {
        self.finish_action = name.into();
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.actions
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    /// Descriptors of the registered actions, in registration order.
    pub fn actions_info(&self) -> Vec<ActionDescriptor> {
        self.actions.iter().map(|a| a.to_descriptor()).collect()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The action type that marks the end of a conversation.
    pub fn finish_action_name(&self) -> &str {
        &self.finish_action
    }

    /// Invoke an action by name.
    pub async fn invoke(&self, name: &str, parameters: Value) -> ActionReturn {
        if let Some(action) = self.get(name) {
            debug!(action = %name, "Running action");
            return match action.run(parameters.clone()).await {
                Ok(result) => ActionReturn::success(name, parameters, result),
                Err(e) => {
                    warn!(action = %name, error = %e, "Action failed");
                    ActionReturn::failure(name, parameters, status_for(&e), e.to_string())
                }
            };
        }

        if name == self.finish_action {
            return finish(&self.finish_action, parameters);
        }

        if name == NO_ACTION {
            return ActionReturn::failure(
                NO_ACTION,
                parameters,
                ActionStatus::ArgsError,
                "Please follow the format",
            );
        }

        warn!(action = %name, "Model requested an unregistered action");
        ActionReturn::failure(
            "InvalidAction",
            parameters,
            ActionStatus::ArgsError,
            "Invalid action",
        )
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn status_for(err: &ActionError) -> ActionStatus {
    match err {
        ActionError::InvalidArguments(_) => ActionStatus::ArgsError,
        ActionError::Http { .. } => ActionStatus::HttpError,
        ActionError::ExecutionFailed { .. } | ActionError::Timeout { .. } => ActionStatus::ApiError,
    }
}

/// The finish action echoes its `response` argument (or the raw arguments
/// when it is not a string) as the final answer.
fn finish(name: &str, parameters: Value) -> ActionReturn {
    let response = match parameters.get("response") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => match &parameters {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        },
    };
    ActionReturn::success(name, parameters, vec![ResultItem::text(response)])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test action for unit tests.
    struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn name(&self) -> &str {
            "Echo.say"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!([{ "name": "text", "type": "STRING" }])
        }
        fn required(&self) -> Vec<String> {
            vec!["text".into()]
        }
        async fn run(&self, parameters: Value) -> Result<Vec<ResultItem>, ActionError> {
            let text = parameters["text"]
                .as_str()
                .ok_or_else(|| ActionError::InvalidArguments("Missing 'text'".into()))?;
            Ok(vec![ResultItem::text(text)])
        }
    }

    #[test]
    fn register_preserves_order_and_replaces() {
        let executor = ActionExecutor::new()
            .with_action(Box::new(EchoAction))
            .with_action(Box::new(EchoAction));
        assert_eq!(executor.action_names(), vec!["Echo.say"]);
        assert_eq!(executor.actions_info()[0].required, vec!["text".to_string()]);
    }

    #[tokio::test]
    async fn invoke_registered_action() {
        let executor = ActionExecutor::new().with_action(Box::new(EchoAction));
        let ret = executor
            .invoke("Echo.say", serde_json::json!({"text": "hello"}))
            .await;
        assert!(ret.status.is_success());
        assert_eq!(ret.action_type, "Echo.say");
        assert_eq!(ret.format_result(), "hello");
    }

    #[tokio::test]
    async fn action_error_becomes_failed_return() {
        let executor = ActionExecutor::new().with_action(Box::new(EchoAction));
        let ret = executor.invoke("Echo.say", serde_json::json!({})).await;
        assert_eq!(ret.status, ActionStatus::ArgsError);
        assert!(ret.payload().contains("Missing 'text'"));
    }

    #[tokio::test]
    async fn unknown_action_is_invalid() {
        let executor = ActionExecutor::new();
        let ret = executor.invoke("Nope.run", serde_json::json!({})).await;
        assert_eq!(ret.action_type, "InvalidAction");
        assert_eq!(ret.errmsg.as_deref(), Some("Invalid action"));
    }

    #[tokio::test]
    async fn finish_action_echoes_response() {
        let executor = ActionExecutor::new();
        let ret = executor
            .invoke(FINISH_ACTION, serde_json::json!({"response": "Farewell."}))
            .await;
        assert_eq!(ret.action_type, executor.finish_action_name());
        assert_eq!(ret.format_result(), "Farewell.");
        assert_eq!(ret.args["response"], "Farewell.");
    }
}
