//! Action results back into the conversation.

use roleplayer_core::{ActionReturn, Content, Message, ToolKind};

use crate::protocol::Protocol;

impl Protocol {
    /// Render an action result as a message named after `kind`.
    ///
    /// With a `fallback_role` or `belong` role the payload is wrapped in the
    /// execute markup. Otherwise the message keeps the execute role and
    /// carries the bare payload.
    pub fn format_response(&self, ret: &ActionReturn, kind: ToolKind) -> Message {
        let execute = &self.config.execute;
        let payload = ret.payload();
        let wrapped = format!("{}{payload}{}", execute.begin, execute.end);

        let (role, content) = match (execute.fallback_role, execute.belong) {
            (Some(role), _) | (None, Some(role)) => (role, wrapped),
            (None, None) => (execute.role, payload),
        };

        Message {
            role,
            content: Content::Text(content),
            name: Some(kind.as_str().to_string()),
        }
    }
}
