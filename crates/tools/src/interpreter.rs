//! Code interpreter action: runs model-written code in a child process.
//!
//! The code is passed as the last argument to a configurable program
//! (`python3 -c <code>` by default) and killed after a timeout.

use std::time::Duration;

use async_trait::async_trait;
use roleplayer_core::{Action, ActionError, ResultItem};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

pub const NAME: &str = "IPythonInterpreter";

pub struct CodeInterpreter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CodeInterpreter {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `python3 -c`, 20 second timeout.
    pub fn python() -> Self {
        Self::new("python3", vec!["-c".into()], Duration::from_secs(20))
    }
}

#[async_trait]
impl Action for CodeInterpreter {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Runs Python code and returns what it prints. Print every value you want to see; \
         state is not kept between calls."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!([{
            "name": "command",
            "type": "STRING",
            "description": "Python source code"
        }])
    }

    fn required(&self) -> Vec<String> {
        vec!["command".into()]
    }

    async fn run(&self, parameters: Value) -> Result<Vec<ResultItem>, ActionError> {
        let code = parameters
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidArguments("missing 'command'".into()))?;

        debug!(program = %self.program, bytes = code.len(), "Running interpreter code");

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(code)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ActionError::Timeout {
                action: NAME.into(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ActionError::ExecutionFailed {
                action: NAME.into(),
                reason: format!("failed to start '{}': {e}", self.program),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(exit_code = code, "Interpreter code failed");
            return Err(ActionError::ExecutionFailed {
                action: NAME.into(),
                reason: format!("[exit code: {code}]\n{}", stderr.trim()),
            });
        }

        let text = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\n[stderr]: {}", stdout.trim(), stderr.trim())
        };
        Ok(vec![ResultItem::text(text)])
    }
}
