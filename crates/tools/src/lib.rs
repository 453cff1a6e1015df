//! Built-in actions for Roleplayer.
//!
//! Plugins are called with JSON arguments (`Calculator.evaluate`,
//! `Dice.roll`); the interpreter runs code blocks the model writes.

pub mod calculator;
pub mod dice;
pub mod interpreter;

use roleplayer_core::ActionExecutor;

pub use calculator::Calculator;
pub use dice::Dice;
pub use interpreter::CodeInterpreter;

/// Plugin executor with every built-in plugin.
pub fn default_plugin_executor() -> ActionExecutor {
    ActionExecutor::new()
        .with_action(Box::new(Calculator))
        .with_action(Box::new(Dice::new()))
}

/// Interpreter executor around a single interpreter action.
pub fn interpreter_executor(interpreter: CodeInterpreter) -> ActionExecutor {
    ActionExecutor::new().with_action(Box::new(interpreter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplayer_core::ActionStatus;

    #[test]
    fn default_plugins_in_order() {
        let executor = default_plugin_executor();
        assert_eq!(
            executor.action_names(),
            vec!["Calculator.evaluate", "Dice.roll"]
        );
    }

    #[tokio::test]
    async fn executor_reports_failures_as_returns() {
        let executor = default_plugin_executor();
        let ret = executor
            .invoke("Calculator.evaluate", serde_json::json!({"expression": "1/0"}))
            .await;
        assert_eq!(ret.status, ActionStatus::ApiError);
        assert!(ret.errmsg.unwrap().contains("division by zero"));

        let ret = executor
            .invoke("Calculator.evaluate", serde_json::json!({"expression": "6*7"}))
            .await;
        assert_eq!(ret.format_result(), "42");
    }

    #[test]
    fn interpreter_executor_exposes_single_action() {
        let executor = interpreter_executor(CodeInterpreter::python());
        assert_eq!(executor.action_names(), vec![interpreter::NAME]);
    }
}
