//! Conversation model

use serde::{Deserialize, Serialize};

use super::Message;

/// A conversation and its transcript, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-side identifier. The chat server keys conversations by title,
    /// so this changes on rename.
    pub chat_id: String,
    pub name: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(chat_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            name: name.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
