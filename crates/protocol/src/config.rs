//! Serializable protocol configuration.
//!
//! Maps to the `[protocol]` table of the application config. The defaults
//! describe the InternLM2 action markup with roleplaying prompts.

use std::collections::BTreeMap;

use roleplayer_core::{Message, ProtocolError, Role, ToolKind};
use serde::{Deserialize, Serialize};

use crate::template;

/// Prefix put in front of every plugin description in the tool catalogue.
pub const API_PREFIX: &str = "This is the subfunction for tool '{tool_name}', you can use this tool. The description of this function is: \n{description}";

pub const DEFAULT_ROLE_NAME: &str = "Default Player";

/// How one sub-role is rendered into the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Text placed before the content. For the `tool` role this is a
    /// template over `{start_token}` and `{name}`.
    #[serde(default)]
    pub begin: String,

    /// Text placed after the content
    #[serde(default)]
    pub end: String,

    /// Fold the rendered text into the previous message of this role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belong: Option<Role>,

    /// Emit the rendered text as a new message of this role instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_token: Option<String>,

    /// Marker written after the start token for each tool kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub name_map: BTreeMap<ToolKind, String>,
}

impl RoleConfig {
    pub fn start_token(&self) -> &str {
        self.start_token.as_deref().unwrap_or_default()
    }

    pub fn marker(&self, kind: ToolKind) -> &str {
        self.name_map.get(&kind).map(String::as_str).unwrap_or_default()
    }
}

/// How action results are rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteConfig {
    /// Role used when neither `fallback_role` nor `belong` is set
    #[serde(default = "default_execute_role")]
    pub role: Role,

    #[serde(default)]
    pub begin: String,

    #[serde(default)]
    pub end: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belong: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_role: Option<Role>,
}

fn default_execute_role() -> Role {
    Role::Execute
}

impl ExecuteConfig {
    /// The same rendering rule as a plain role config.
    pub fn as_role_config(&self) -> RoleConfig {
        RoleConfig {
            begin: self.begin.clone(),
            end: self.end.clone(),
            belong: self.belong,
            fallback_role: self.fallback_role,
            start_token: None,
            name_map: BTreeMap::new(),
        }
    }
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            role: Role::Execute,
            begin: String::new(),
            end: String::new(),
            belong: None,
            fallback_role: Some(Role::Environment),
        }
    }
}

/// The full protocol configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Leading system prompt; empty disables it
    #[serde(default = "default_meta_prompt")]
    pub meta_prompt: String,

    /// Template over `{code_prompt}`; empty disables the interpreter prompt
    #[serde(default = "default_interpreter_prompt")]
    pub interpreter_prompt: String,

    /// Template over `{prompt}`; empty disables the plugin prompt
    #[serde(default = "default_plugin_prompt")]
    pub plugin_prompt: String,

    /// Example conversations placed before the real history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub few_shot: Vec<Vec<Message>>,

    #[serde(default = "default_language")]
    pub language: RoleConfig,

    #[serde(default = "default_tool")]
    pub tool: RoleConfig,

    #[serde(default)]
    pub execute: ExecuteConfig,
}

fn default_meta_prompt() -> String {
    "When tools are available, call the appropriate tool according to what the conversation needs.".into()
}

fn default_interpreter_prompt() -> String {
    interpreter_prompt_for(DEFAULT_ROLE_NAME)
}

fn default_plugin_prompt() -> String {
    concat!(
        "You can use the following tools:",
        "\n{prompt}\n",
        "Apply these tools sensibly and avoid unnecessary tool calls! ",
        "Never fabricate chat content or call tools at random!"
    )
    .into()
}

fn default_language() -> RoleConfig {
    RoleConfig {
        begin: String::new(),
        end: String::new(),
        belong: Some(Role::Assistant),
        fallback_role: None,
        start_token: None,
        name_map: BTreeMap::new(),
    }
}

fn default_tool() -> RoleConfig {
    RoleConfig {
        begin: "{start_token}{name}\n".into(),
        end: "<|action_end|>\n".into(),
        belong: Some(Role::Assistant),
        fallback_role: None,
        start_token: Some("<|action_start|>".into()),
        name_map: BTreeMap::from([
            (ToolKind::Plugin, "<|plugin|>".to_string()),
            (ToolKind::Interpreter, "<|interpreter|>".to_string()),
        ]),
    }
}

/// Interpreter prompt that casts the model as `role_name`.
pub fn interpreter_prompt_for(role_name: &str) -> String {
    format!(
        "You are {}, taking part in a roleplaying chat contest. \
         You can call tools that will help you during the chat. \
         Talk to the others in your own character's style and keep your reasoning rigorous!",
        template::escape(role_name)
    )
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            meta_prompt: default_meta_prompt(),
            interpreter_prompt: default_interpreter_prompt(),
            plugin_prompt: default_plugin_prompt(),
            few_shot: Vec::new(),
            language: default_language(),
            tool: default_tool(),
            execute: ExecuteConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Check every template against the placeholders it may use.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        template::validate(&self.interpreter_prompt, &["code_prompt"])?;
        template::validate(&self.plugin_prompt, &["prompt"])?;
        template::validate(&self.tool.begin, &["start_token", "name"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tool.marker(ToolKind::Plugin), "<|plugin|>");
        assert_eq!(config.execute.fallback_role, Some(Role::Environment));
    }

    #[test]
    fn role_name_with_braces_is_escaped() {
        let prompt = interpreter_prompt_for("Lord {Horo}");
        assert!(template::validate(&prompt, &["code_prompt"]).is_ok());
        assert!(template::render(&prompt, &[]).unwrap().contains("Lord {Horo}"));
    }

    #[test]
    fn bad_tool_begin_rejected() {
        let config = ProtocolConfig {
            tool: RoleConfig {
                begin: "{start}{name}".into(),
                ..default_tool()
            },
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_from_toml() {
        let config: ProtocolConfig = toml::from_str(
            r#"
meta_prompt = ""
plugin_prompt = "Tools:\n{prompt}"

[tool]
begin = "{start_token}{name}\n"
start_token = "<A>"
end = "<E>\n"
belong = "assistant"

[tool.name_map]
plugin = "<P>"
interpreter = "<I>"

[execute]
role = "execute"
fallback_role = "environment"
"#,
        )
        .unwrap();
        assert!(config.meta_prompt.is_empty());
        assert_eq!(config.tool.marker(ToolKind::Interpreter), "<I>");
        assert_eq!(config.language.belong, Some(Role::Assistant));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_tool_kind_in_name_map_rejected() {
        let result: Result<ProtocolConfig, _> = toml::from_str(
            r#"
[tool.name_map]
browser = "<B>"
"#,
        );
        assert!(result.is_err());
    }
}
