#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

use crate::llm::ApiMessage;

/// Greeting every conversation starts with. Never sent upstream.
pub const SEED_GREETING: &str = "Hello! I'm your AI wellness companion. How can I help you today?";

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

/// Whether a message is final or the in-flight typing placeholder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageStatus {
    #[default]
    Settled,
    Pending,
}

/// A single chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub status: MessageStatus,
}

impl Message {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

/// Ordered message log for one conversation.
///
/// Ids come from a counter that never rewinds, so removing the placeholder
/// leaves a gap rather than reusing its id.
#[derive(Clone, Debug)]
pub struct ChatLog {
    messages: Vec<Message>,
    next_id: u64,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLog {
    /// A log holding only the seed greeting.
    #[must_use]
    pub fn new() -> Self {
        let mut log = Self { messages: Vec::new(), next_id: 1 };
        log.push(SEED_GREETING.to_string(), Sender::Assistant, MessageStatus::Settled);
        log
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push_user(&mut self, text: String) -> u64 {
        self.push(text, Sender::User, MessageStatus::Settled)
    }

    pub fn push_assistant(&mut self, text: String) -> u64 {
        self.push(text, Sender::Assistant, MessageStatus::Settled)
    }

    /// Append the empty assistant placeholder. Does nothing if one is already
    /// present, returning its id.
    pub fn push_placeholder(&mut self) -> u64 {
        if let Some(pending) = self.messages.last().filter(|m| m.is_pending()) {
            return pending.id;
        }
        self.push(String::new(), Sender::Assistant, MessageStatus::Pending)
    }

    /// Remove the trailing placeholder, if any. Returns whether one was removed.
    pub fn remove_placeholder(&mut self) -> bool {
        if self.messages.last().is_some_and(Message::is_pending) {
            self.messages.pop();
            return true;
        }
        false
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(Message::is_pending)
    }

    /// Conversation history as the completion service expects it: every
    /// settled message after the seed greeting, in order.
    #[must_use]
    pub fn history(&self) -> Vec<ApiMessage> {
        self.messages
            .iter()
            .skip(1)
            .filter(|m| !m.is_pending())
            .map(|m| match m.sender {
                Sender::User => ApiMessage::user(m.text.clone()),
                Sender::Assistant => ApiMessage::assistant(m.text.clone()),
            })
            .collect()
    }

    fn push(&mut self, text: String, sender: Sender, status: MessageStatus) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message { id, text, sender, status });
        id
    }
}
