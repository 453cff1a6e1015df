//! Action domain types: what the model asks for and what it gets back.

use serde::{Deserialize, Serialize};

/// The two tool channels the protocol knows about.
///
/// Deserialization rejects anything else, so an unknown kind in a
/// configuration file fails at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolKind {
    Plugin,
    Interpreter,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::Plugin, ToolKind::Interpreter];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Plugin => "plugin",
            ToolKind::Interpreter => "interpreter",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plugin" => Ok(ToolKind::Plugin),
            "interpreter" => Ok(ToolKind::Interpreter),
            other => Err(format!(
                "unknown tool kind '{other}', expected 'plugin' or 'interpreter'"
            )),
        }
    }
}

impl TryFrom<String> for ToolKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ToolKind> for String {
    fn from(kind: ToolKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A concrete action invocation: `{"name": ..., "parameters": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// An interpreter call: `parameters = {"command": code}`.
    pub fn command(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(name, serde_json::json!({ "command": code.into() }))
    }

    /// The interpreter command, if this call carries one.
    pub fn command_text(&self) -> Option<&str> {
        self.parameters.get("command").and_then(|c| c.as_str())
    }
}

/// Outcome of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    /// The arguments did not fit the action
    ArgsError,
    /// The action itself failed
    ApiError,
    /// A remote call made by the action failed
    HttpError,
}

impl ActionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ActionStatus::Success)
    }
}

/// Media type of a single result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Text,
    Image,
    Audio,
    File,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Text => "text",
            ResultKind::Image => "image",
            ResultKind::Audio => "audio",
            ResultKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub content: String,
}

impl ResultItem {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Text,
            content: content.into(),
        }
    }
}

/// The result of dispatching one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReturn {
    /// Name of the action that ran
    #[serde(rename = "type")]
    pub action_type: String,

    /// Arguments the action ran with
    #[serde(default)]
    pub args: serde_json::Value,

    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<ResultItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,

    /// The language the model produced before requesting this action
    #[serde(default)]
    pub thought: String,
}

impl ActionReturn {
    pub fn success(
        action_type: impl Into<String>,
        args: serde_json::Value,
        result: Vec<ResultItem>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            args,
            status: ActionStatus::Success,
            result,
            errmsg: None,
            thought: String::new(),
        }
    }

    pub fn failure(
        action_type: impl Into<String>,
        args: serde_json::Value,
        status: ActionStatus,
        errmsg: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            args,
            status,
            result: Vec::new(),
            errmsg: Some(errmsg.into()),
            thought: String::new(),
        }
    }

    /// Render the result items: text verbatim, media as markdown links,
    /// one item per line.
    pub fn format_result(&self) -> String {
        self.result
            .iter()
            .map(|item| match item.kind {
                ResultKind::Text => item.content.clone(),
                kind => format!("[{}]({})", kind.as_str(), item.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// What the model gets to see: the formatted result on success, the
    /// error message otherwise.
    pub fn payload(&self) -> String {
        if self.status.is_success() {
            self.format_result()
        } else {
            self.errmsg.clone().unwrap_or_default()
        }
    }
}

/// Self-description of an action, shown to the model in the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub required: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_kind_rejects_unknown() {
        assert_eq!("plugin".parse::<ToolKind>(), Ok(ToolKind::Plugin));
        assert!("browser".parse::<ToolKind>().is_err());
        assert!(serde_json::from_str::<ToolKind>(r#""browser""#).is_err());
    }

    #[test]
    fn format_result_mixes_media() {
        let ret = ActionReturn::success(
            "Painter.draw",
            serde_json::json!({}),
            vec![
                ResultItem::text("done"),
                ResultItem {
                    kind: ResultKind::Image,
                    content: "/tmp/cat.png".into(),
                },
            ],
        );
        assert_eq!(ret.format_result(), "done\n[image](/tmp/cat.png)");
        assert_eq!(ret.payload(), ret.format_result());
    }

    #[test]
    fn failure_payload_is_errmsg() {
        let ret = ActionReturn::failure(
            "Calculator.evaluate",
            serde_json::json!({"expression": "1/0"}),
            ActionStatus::ApiError,
            "Division by zero",
        );
        assert!(!ret.status.is_success());
        assert_eq!(ret.payload(), "Division by zero");
    }

    #[test]
    fn action_return_serializes_type_field() {
        let ret = ActionReturn::success("FinishAction", serde_json::json!({}), vec![]);
        let json = serde_json::to_value(&ret).unwrap();
        assert_eq!(json["type"], "FinishAction");
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn command_text_reads_interpreter_parameters() {
        let call = ActionCall::command("IPythonInterpreter", "print(2)");
        assert_eq!(call.command_text(), Some("print(2)"));
        assert_eq!(ActionCall::new("x", serde_json::json!({})).command_text(), None);
    }
}
