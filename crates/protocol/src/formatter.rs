//! History to prompt: system head plus sub-role folding.

use roleplayer_core::{ActionExecutor, Content, Message, ProtocolError, Role, ToolKind};
use tracing::trace;

use crate::builder::HistoryBuilder;
use crate::config::API_PREFIX;
use crate::protocol::Protocol;
use crate::{render, template};

impl Protocol {
    /// Build the prompt for one model call.
    ///
    /// The head is, in order: the meta prompt, the interpreter prompt, the
    /// plugin catalogue. Each is skipped when its template is empty or its
    /// executor is missing. Few-shot examples and then `history` follow,
    /// with every sub-role message folded into a primitive role.
    pub fn format(
        &self,
        history: &[Message],
        plugin: Option<&ActionExecutor>,
        interpreter: Option<&ActionExecutor>,
    ) -> Result<Vec<Message>, ProtocolError> {
        let mut out = HistoryBuilder::new();

        if !self.config.meta_prompt.is_empty() {
            out.push(Message::system(self.config.meta_prompt.clone()));
        }

        if let Some(executor) = interpreter
            && !self.config.interpreter_prompt.is_empty()
        {
            let description = executor
                .actions_info()
                .into_iter()
                .next()
                .map(|info| info.description)
                .unwrap_or_default();
            let prompt = template::render(
                &self.config.interpreter_prompt,
                &[("code_prompt", &description)],
            )?;
            out.push(Message::system(prompt).with_name(ToolKind::Interpreter.as_str()));
        }

        if let Some(executor) = plugin
            && !executor.is_empty()
            && !self.config.plugin_prompt.is_empty()
        {
            let catalogue = plugin_catalogue(executor)?;
            let prompt = template::render(&self.config.plugin_prompt, &[("prompt", &catalogue)])?;
            out.push(Message::system(prompt).with_name(ToolKind::Plugin.as_str()));
        }

        for example in &self.few_shot {
            out.extend(example.iter().cloned());
        }
        out.extend(self.format_sub_role(history)?);

        trace!(messages = out.len(), "Formatted prompt");
        Ok(out.finish())
    }

    /// Fold sub-role messages into primitive roles.
    ///
    /// Primitive messages pass through. A sub-role message is wrapped in its
    /// role's begin/end markup and then emitted as its `fallback_role`, merged
    /// into a preceding `belong` message, or kept under its own role.
    pub fn format_sub_role(&self, messages: &[Message]) -> Result<Vec<Message>, ProtocolError> {
        let mut out = HistoryBuilder::new();

        for message in messages {
            if message.role.is_primitive() {
                if matches!(message.content, Content::Action(_)) {
                    return Err(ProtocolError::UnexpectedAction(message.role.to_string()));
                }
                out.push(message.clone());
                continue;
            }

            let config = self.role_config(message.role)?;
            let (begin, body) = if message.role == Role::Tool {
                let kind = tool_kind(message)?;
                let begin = template::render(
                    &config.begin,
                    &[
                        ("start_token", config.start_token()),
                        ("name", config.marker(kind)),
                    ],
                )?;
                (begin, tool_body(kind, &message.content)?)
            } else {
                (config.begin.clone(), content_text(&message.content)?)
            };
            let rendered = format!("{begin}{body}{}", config.end);

            if let Some(role) = config.fallback_role {
                out.push(Message {
                    role,
                    content: Content::Text(rendered),
                    name: message.name.clone(),
                });
            } else if let Some(role) = config.belong {
                out.merge_or_push(role, &rendered);
            } else {
                out.push(Message {
                    role: message.role,
                    content: Content::Text(rendered),
                    name: message.name.clone(),
                });
            }
        }

        Ok(out.finish())
    }
}

fn tool_kind(message: &Message) -> Result<ToolKind, ProtocolError> {
    let name = message.name.as_deref().unwrap_or_default();
    name.parse()
        .map_err(|_| ProtocolError::UnknownToolName(name.to_string()))
}

/// Interpreter calls render as their bare command, plugin calls as inline
/// JSON of the whole call.
fn tool_body(kind: ToolKind, content: &Content) -> Result<String, ProtocolError> {
    match (kind, content) {
        (_, Content::Text(text)) => Ok(text.clone()),
        (ToolKind::Interpreter, Content::Action(call)) => match call.command_text() {
            Some(command) => Ok(command.to_string()),
            None => render::inline(&call.parameters),
        },
        (ToolKind::Plugin, Content::Action(call)) => render::inline(call),
    }
}

fn content_text(content: &Content) -> Result<String, ProtocolError> {
    match content {
        Content::Text(text) => Ok(text.clone()),
        Content::Action(call) => render::inline(call),
    }
}

/// Pretty JSON list of the plugin descriptors, each description prefixed
/// with the tool banner.
fn plugin_catalogue(executor: &ActionExecutor) -> Result<String, ProtocolError> {
    let mut descriptors = executor.actions_info();
    for descriptor in &mut descriptors {
        let tool_name = descriptor
            .name
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();
        descriptor.description = template::render(
            API_PREFIX,
            &[
                ("tool_name", &tool_name),
                ("description", &descriptor.description),
            ],
        )?;
    }
    render::pretty(&descriptors)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use roleplayer_core::{Action, ActionCall, ActionError, ResultItem};
    use serde_json::Value;

    use super::*;
    use crate::config::{ProtocolConfig, RoleConfig};

    struct Stub {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Action for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!([])
        }
        async fn run(&self, _parameters: Value) -> Result<Vec<ResultItem>, ActionError> {
            Ok(vec![])
        }
    }

    fn marker_protocol() -> Protocol {
        Protocol::new(ProtocolConfig {
            meta_prompt: String::new(),
            tool: RoleConfig {
                begin: "{start_token}{name}\n".into(),
                end: "<E>\n".into(),
                belong: Some(Role::Assistant),
                fallback_role: None,
                start_token: Some("<A>".into()),
                name_map: BTreeMap::from([
                    (ToolKind::Plugin, "<P>".to_string()),
                    (ToolKind::Interpreter, "<I>".to_string()),
                ]),
            },
            ..ProtocolConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn plugin_call_merges_into_previous_assistant() {
        let protocol = marker_protocol();
        let history = vec![
            Message::assistant("Let me check. "),
            Message::tool(
                ToolKind::Plugin,
                ActionCall::new("search", serde_json::json!({"q": "x"})),
            ),
        ];
        let out = protocol.format(&history, None, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::Assistant);
        assert_eq!(
            out[0].text(),
            "Let me check. <A><P>\n{\"name\": \"search\", \"parameters\": {\"q\": \"x\"}}<E>\n"
        );
    }

    #[test]
    fn language_and_tool_fold_into_one_assistant_message() {
        let protocol = marker_protocol();
        let history = vec![
            Message::user("roll"),
            Message::language("Rolling. "),
            Message::tool(
                ToolKind::Interpreter,
                ActionCall::command("IPythonInterpreter", "print(4)"),
            ),
            Message::environment("4"),
        ];
        let out = protocol.format(&history, None, None).unwrap();
        let roles: Vec<Role> = out.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Environment]);
        assert_eq!(out[1].text(), "Rolling. <A><I>\nprint(4)<E>\n");

        for pair in out.windows(2) {
            assert!(!(pair[0].role == Role::Assistant && pair[1].role == Role::Assistant));
        }
    }

    #[test]
    fn primitive_history_preserved_after_head() {
        let protocol = Protocol::default();
        let plugins = ActionExecutor::new().with_action(Box::new(Stub {
            name: "Dice.roll",
            description: "Roll dice",
        }));
        let interpreter = ActionExecutor::new().with_action(Box::new(Stub {
            name: "IPythonInterpreter",
            description: "Runs Python",
        }));
        let history = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("again"),
        ];

        let out = protocol
            .format(&history, Some(&plugins), Some(&interpreter))
            .unwrap();

        assert_eq!(out.len(), 6);
        assert_eq!(out[0].role, Role::System);
        assert!(out[0].name.is_none());
        assert_eq!(out[1].name.as_deref(), Some("interpreter"));
        assert_eq!(out[2].name.as_deref(), Some("plugin"));
        assert_eq!(&out[3..], &history[..]);
    }

    #[test]
    fn plugin_catalogue_carries_banner() {
        let protocol = Protocol::default();
        let plugins = ActionExecutor::new().with_action(Box::new(Stub {
            name: "Dice.roll",
            description: "Roll {dice}",
        }));
        let out = protocol.format(&[], Some(&plugins), None).unwrap();
        let catalogue = out[1].text();
        assert!(catalogue.contains("This is the subfunction for tool 'Dice'"));
        assert!(catalogue.contains("Roll {dice}"));
        assert!(catalogue.contains("\n    {\n        \"name\": \"Dice.roll\""));
    }

    #[test]
    fn empty_plugin_executor_adds_no_catalogue() {
        let protocol = Protocol::default();
        let plugins = ActionExecutor::new();
        let out = protocol
            .format(&[Message::user("hi")], Some(&plugins), None)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.name.is_none()));
    }

    #[test]
    fn fallback_role_emits_new_message() {
        let protocol = Protocol::default();
        let out = protocol
            .format_sub_role(&[
                Message::assistant("x"),
                Message::new(Role::Execute, "result"),
            ])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].role, Role::Environment);
        assert_eq!(out[1].text(), "result");
    }

    #[test]
    fn unknown_tool_name_rejected() {
        let protocol = Protocol::default();
        let message = Message::new(Role::Tool, "{}").with_name("browser");
        assert!(matches!(
            protocol.format_sub_role(&[message]),
            Err(ProtocolError::UnknownToolName(_))
        ));
    }

    #[test]
    fn action_call_on_primitive_role_rejected() {
        let protocol = Protocol::default();
        let message = Message {
            role: Role::User,
            content: Content::Action(ActionCall::new("search", serde_json::json!({}))),
            name: None,
        };
        assert!(matches!(
            protocol.format_sub_role(&[message]),
            Err(ProtocolError::UnexpectedAction(role)) if role == "user"
        ));
    }

    #[test]
    fn caller_history_untouched() {
        let protocol = marker_protocol();
        let history = vec![Message::assistant("a"), Message::language("b")];
        let before = history.clone();
        let _ = protocol.format(&history, None, None).unwrap();
        assert_eq!(history, before);
    }
}
