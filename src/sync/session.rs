//! Active conversation state: transcript plus sync cursor

use chrono::{DateTime, Utc};

use super::reconcile::merge_into;
use crate::models::{Conversation, Message, SyncCursor};

/// Owns one conversation's transcript and cursor.
#[derive(Debug, Clone)]
pub struct Session {
    conversation: Conversation,
    cursor: SyncCursor,
}

impl Session {
    pub fn new(conversation: Conversation) -> Self {
        let cursor = SyncCursor::new(conversation.chat_id.clone());
        Self {
            conversation,
            cursor,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.conversation.chat_id
    }

    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// Merge a batch and return what was new.
    pub fn apply(&mut self, batch: &[Message]) -> Vec<Message> {
        self.apply_at(batch, Utc::now())
    }

    /// Like [`Session::apply`] with an explicit receipt time.
    ///
    /// The cursor moves to `now` only when at least one message was accepted.
    pub fn apply_at(&mut self, batch: &[Message], now: DateTime<Utc>) -> Vec<Message> {
        let accepted = merge_into(&mut self.conversation.messages, batch);
        if !accepted.is_empty() {
            self.cursor.last_update = now;
            tracing::debug!(
                "Accepted {} of {} message(s) for {}",
                accepted.len(),
                batch.len(),
                self.cursor.chat_id
            );
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::TimeZone;

    fn session() -> Session {
        let conv = Conversation::new("Chat 1", "Chat 1").with_messages(vec![Message::new(
            Role::User,
            "hi",
            "2024-01-01T10:00:00",
        )]);
        Session::new(conv)
    }

    #[test]
    fn test_cursor_advances_only_on_acceptance() {
        let mut s = session();
        let start = s.cursor().last_update;

        let t1 = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let batch = vec![Message::new(Role::User, "hi", "2024-01-01T10:00:00")];
        assert!(s.apply_at(&batch, t1).is_empty());
        assert_eq!(s.cursor().last_update, start);

        let batch = vec![Message::new(Role::Bot, "hello", "2024-01-01T10:00:05")];
        assert_eq!(s.apply_at(&batch, t1).len(), 1);
        assert_eq!(s.cursor().last_update, t1);
        assert_eq!(s.conversation.messages.len(), 2);
    }

    #[test]
    fn test_cursor_uses_receipt_time_not_message_time() {
        let mut s = session();
        let receipt = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();
        let batch = vec![Message::new(Role::Bot, "old news", "2001-01-01T00:00:00")];
        s.apply_at(&batch, receipt);
        assert_eq!(s.cursor().last_update, receipt);
    }

    #[test]
    fn test_cursor_tracks_conversation() {
        let s = session();
        assert_eq!(s.cursor().chat_id, "Chat 1");
        assert_eq!(s.chat_id(), "Chat 1");
    }
}
