//! Raw model output to a typed action request.
//!
//! The text is run through a small scanner per tool kind:
//!
//! ```text
//! BeforeMarker --marker found--> AfterMarker --end marker cut--> Truncated
//! ```
//!
//! An empty marker or a marker missing from the text leaves the scanner in
//! `BeforeMarker`; a missing or empty end marker leaves the body uncut.

use roleplayer_core::{ActionCall, ToolKind};
use tracing::debug;

use crate::protocol::Protocol;

/// What the model asked for in one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// `None` when the model answered without a tool
    pub kind: Option<ToolKind>,

    /// Free text preceding the action marker
    pub language: String,

    /// Present exactly when `kind` is
    pub action: Option<RequestedAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestedAction {
    /// Unparsed JSON text; decoding is left to the dispatcher
    Plugin(String),
    Interpreter(ActionCall),
}

impl RequestedAction {
    pub fn kind(&self) -> ToolKind {
        match self {
            RequestedAction::Plugin(_) => ToolKind::Plugin,
            RequestedAction::Interpreter(_) => ToolKind::Interpreter,
        }
    }
}

impl ActionRequest {
    fn plain(language: impl Into<String>) -> Self {
        Self {
            kind: None,
            language: language.into(),
            action: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan<'a> {
    BeforeMarker(&'a str),
    AfterMarker { prefix: &'a str, rest: &'a str },
    Truncated { prefix: &'a str, body: &'a str },
}

impl<'a> Scan<'a> {
    /// Look for `marker` in `text`. Text after a second occurrence of the
    /// marker is dropped.
    fn start(text: &'a str, marker: Option<&str>) -> Self {
        let Some(marker) = marker.filter(|m| !m.is_empty()) else {
            return Scan::BeforeMarker(text);
        };
        match text.find(marker) {
            Some(at) => {
                let rest = &text[at + marker.len()..];
                let rest = rest.find(marker).map_or(rest, |next| &rest[..next]);
                Scan::AfterMarker {
                    prefix: &text[..at],
                    rest,
                }
            }
            None => Scan::BeforeMarker(text),
        }
    }

    /// Cut the action body at the first `end`.
    fn truncate(self, end: &str) -> Self {
        match self {
            Scan::AfterMarker { prefix, rest } => {
                let body = if end.is_empty() {
                    rest
                } else {
                    rest.find(end).map_or(rest, |at| &rest[..at])
                };
                Scan::Truncated { prefix, body }
            }
            other => other,
        }
    }
}

impl Protocol {
    /// Split raw model output into language and an optional action.
    ///
    /// `interpreter_action` names the action an interpreter request is
    /// addressed to. Never fails: text that matches no marker is returned as
    /// plain language, cut at the start token.
    pub fn parse(&self, raw: &str, interpreter_action: Option<&str>) -> ActionRequest {
        let text = self.strip_language_prefix(raw);
        let end = self.config.tool.end.trim();

        let plugin = self.tool_marker(ToolKind::Plugin);
        if let Scan::Truncated { prefix, body } = Scan::start(text, plugin.as_deref()).truncate(end) {
            debug!(kind = "plugin", "Model requested an action");
            return ActionRequest {
                kind: Some(ToolKind::Plugin),
                language: prefix.to_string(),
                action: Some(RequestedAction::Plugin(body.to_string())),
            };
        }

        let interpreter = self.tool_marker(ToolKind::Interpreter);
        if let Scan::Truncated { prefix, body } =
            Scan::start(text, interpreter.as_deref()).truncate(end)
        {
            debug!(kind = "interpreter", "Model requested an action");
            return ActionRequest {
                kind: Some(ToolKind::Interpreter),
                language: prefix.to_string(),
                action: Some(RequestedAction::Interpreter(ActionCall::command(
                    interpreter_action.unwrap_or_default(),
                    body.trim(),
                ))),
            };
        }

        let start_token = self.config.tool.start_token();
        match Scan::start(text, Some(start_token)) {
            Scan::AfterMarker { prefix, .. } | Scan::Truncated { prefix, .. } => {
                ActionRequest::plain(prefix)
            }
            Scan::BeforeMarker(all) => ActionRequest::plain(all),
        }
    }

    /// Keep only what follows the last language-begin marker.
    fn strip_language_prefix<'a>(&self, raw: &'a str) -> &'a str {
        let begin = self.config.language.begin.as_str();
        if begin.is_empty() {
            return raw;
        }
        raw.rfind(begin).map_or(raw, |at| &raw[at + begin.len()..])
    }
}
