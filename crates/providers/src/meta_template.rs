//! InternLM2 chat markup for raw completion endpoints.
//!
//! ```text
//! <|im_start|>system
//! ...<|im_end|>
//! <|im_start|>system name=<|plugin|>
//! ...<|im_end|>
//! <|im_start|>user
//! ...<|im_end|>
//! <|im_start|>assistant
//! ```

use roleplayer_core::{Message, Role};

const IM_START: &str = "<|im_start|>";
const IM_END: &str = "<|im_end|>";

/// Renders prompt messages into one string and cleans raw completions.
#[derive(Debug, Clone)]
pub struct MetaTemplate {
    plugin_marker: String,
    interpreter_marker: String,
}

impl MetaTemplate {
    pub fn internlm2() -> Self {
        Self {
            plugin_marker: "<|plugin|>".into(),
            interpreter_marker: "<|interpreter|>".into(),
        }
    }

    /// The whole prompt, ending with an open assistant turn.
    pub fn render(&self, messages: &[Message]) -> String {
        let mut prompt = String::new();
        for message in messages {
            let role = template_role(message.role);
            prompt.push_str(IM_START);
            prompt.push_str(role);
            if let Some(marker) = self.name_marker(message) {
                prompt.push_str(" name=");
                prompt.push_str(marker);
            }
            prompt.push('\n');
            prompt.push_str(message.text());
            prompt.push_str(IM_END);
            prompt.push('\n');
        }
        prompt.push_str(&self.generation_prefix());
        prompt
    }

    pub fn generation_prefix(&self) -> String {
        format!("{IM_START}assistant\n")
    }

    /// Stop sequence that closes a turn.
    pub fn stop_word(&self) -> &'static str {
        IM_END
    }

    /// The reply proper: text after the last assistant header, cut at the
    /// end-of-turn token.
    pub fn extract_reply(&self, raw: &str) -> String {
        let reply = raw.rsplit("assistant\n").next().unwrap_or(raw);
        reply.split(IM_END).next().unwrap_or(reply).to_string()
    }

    /// Only system and environment turns carry a sub-role name.
    fn name_marker(&self, message: &Message) -> Option<&str> {
        if !matches!(template_role(message.role), "system" | "environment") {
            return None;
        }
        match message.name.as_deref()? {
            "plugin" => Some(&self.plugin_marker),
            "interpreter" => Some(&self.interpreter_marker),
            _ => None,
        }
    }
}

impl Default for MetaTemplate {
    fn default() -> Self {
        Self::internlm2()
    }
}

/// Sub-roles that survive formatting are folded into the nearest primitive.
fn template_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant | Role::Language | Role::Tool => "assistant",
        Role::Environment | Role::Execute => "environment",
    }
}
