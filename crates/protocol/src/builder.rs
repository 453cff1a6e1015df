//! Append-only accumulator for formatted messages.

use roleplayer_core::{Content, Message, Role};

/// Owns the formatted output while it is being built.
///
/// Messages are only ever appended; the one exception is merging a fragment
/// into the most recent message, which replaces the last element with a new
/// message instead of editing it in place. Input messages are cloned on the
/// way in, so the caller's history is never touched.
#[derive(Debug, Default)]
pub struct HistoryBuilder {
    messages: Vec<Message>,
}

impl HistoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn last_role(&self) -> Option<Role> {
        self.messages.last().map(|m| m.role)
    }

    /// Swap the last message for `message`. Pushes when empty.
    pub fn replace_last(&mut self, message: Message) {
        match self.messages.last_mut() {
            Some(last) => *last = message,
            None => self.messages.push(message),
        }
    }

    /// Append `fragment` to the last message when it already has `role`,
    /// otherwise start a new message with that role.
    pub fn merge_or_push(&mut self, role: Role, fragment: &str) {
        match self.messages.last() {
            Some(last) if last.role == role => {
                let merged = Message {
                    role,
                    content: Content::Text(format!("{}{fragment}", last.text())),
                    name: last.name.clone(),
                };
                self.replace_last(merged);
            }
            _ => self.push(Message::new(role, fragment)),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn finish(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_into_matching_last() {
        let mut builder = HistoryBuilder::new();
        builder.push(Message::assistant("Let me check. "));
        builder.merge_or_push(Role::Assistant, "<call>");
        let out = builder.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text(), "Let me check. <call>");
    }

    #[test]
    fn push_when_last_differs_or_empty() {
        let mut builder = HistoryBuilder::new();
        builder.merge_or_push(Role::Assistant, "first");
        builder.push(Message::user("hi"));
        builder.merge_or_push(Role::Assistant, "second");
        let roles: Vec<Role> = builder.finish().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    }

    #[test]
    fn merge_keeps_sub_role_name() {
        let mut builder = HistoryBuilder::new();
        builder.push(Message::system("a").with_name("plugin"));
        builder.merge_or_push(Role::System, "b");
        let out = builder.finish();
        assert_eq!(out[0].name.as_deref(), Some("plugin"));
        assert_eq!(out[0].text(), "ab");
    }
}
