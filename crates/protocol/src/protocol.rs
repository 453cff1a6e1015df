//! The immutable protocol bundle shared by the formatter, the parser and the
//! result formatter.

use std::collections::HashMap;

use roleplayer_core::{Message, ProtocolError, Role, ToolKind};

use crate::config::{ProtocolConfig, RoleConfig};

/// Prompt markup for one agent.
///
/// Built once from a validated [`ProtocolConfig`] and never mutated; share it
/// behind an `Arc` when several tasks need it.
#[derive(Debug, Clone)]
pub struct Protocol {
    pub(crate) config: ProtocolConfig,
    pub(crate) roles: HashMap<Role, RoleConfig>,
    pub(crate) few_shot: Vec<Vec<Message>>,
}

impl Protocol {
    pub fn new(config: ProtocolConfig) -> Result<Self, ProtocolError> {
        config.validate()?;

        let roles = role_table(&config);
        let mut protocol = Self {
            config,
            roles,
            few_shot: Vec::new(),
        };

        // Example conversations never change, so render them up front. This
        // also surfaces a malformed example at construction.
        let few_shot = protocol
            .config
            .few_shot
            .iter()
            .map(|conversation| protocol.format_sub_role(conversation))
            .collect::<Result<Vec<_>, _>>()?;
        protocol.few_shot = few_shot;

        Ok(protocol)
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub(crate) fn role_config(&self, role: Role) -> Result<&RoleConfig, ProtocolError> {
        self.roles
            .get(&role)
            .ok_or_else(|| ProtocolError::MissingRoleConfig(role.to_string()))
    }

    /// `start_token + marker` for `kind`, or `None` when the marker is unset.
    pub fn tool_marker(&self, kind: ToolKind) -> Option<String> {
        let marker = self.config.tool.marker(kind);
        if marker.is_empty() {
            None
        } else {
            Some(format!("{}{marker}", self.config.tool.start_token()))
        }
    }
}

fn role_table(config: &ProtocolConfig) -> HashMap<Role, RoleConfig> {
    HashMap::from([
        (Role::Language, config.language.clone()),
        (Role::Tool, config.tool.clone()),
        (Role::Execute, config.execute.as_role_config()),
    ])
}

impl Default for Protocol {
    /// The default markup. Its config has no few-shot examples, so nothing
    /// needs pre-rendering.
    fn default() -> Self {
        let config = ProtocolConfig::default();
        Self {
            roles: role_table(&config),
            config,
            few_shot: Vec::new(),
        }
    }
}
