//! The message history of one call.

use roleplayer_core::Message;

/// Caller history followed by the messages generated during this call.
///
/// Append-only. `offset` marks where the generated messages begin; they are
/// handed back as the call's inner steps.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    offset: usize,
}

impl Conversation {
    pub fn new(history: Vec<Message>) -> Self {
        let offset = history.len();
        Self {
            messages: history,
            offset,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn inner_steps(&self) -> &[Message] {
        &self.messages[self.offset..]
    }

    pub fn into_inner_steps(mut self) -> Vec<Message> {
        self.messages.split_off(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_steps_start_after_history() {
        let mut conversation = Conversation::new(vec![Message::user("Who goes there?")]);
        assert!(conversation.inner_steps().is_empty());

        conversation.push(Message::language("A traveller."));
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.inner_steps(), &[Message::language("A traveller.")]);
        assert_eq!(
            conversation.into_inner_steps(),
            vec![Message::language("A traveller.")]
        );
    }
}
