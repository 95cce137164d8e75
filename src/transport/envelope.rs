//! JSON envelopes exchanged over the push channel

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Message, SyncCursor};

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    Subscribe {
        chat_id: String,
        email: String,
    },
    GetUpdates {
        email: String,
        chat_id: String,
        last_update: String,
    },
}

impl ClientEnvelope {
    pub fn subscribe(chat_id: &str, email: &str) -> Self {
        ClientEnvelope::Subscribe {
            chat_id: chat_id.to_string(),
            email: email.to_string(),
        }
    }

    pub fn get_updates(cursor: &SyncCursor, email: &str) -> Self {
        ClientEnvelope::GetUpdates {
            email: email.to_string(),
            chat_id: cursor.chat_id.clone(),
            last_update: cursor.last_update_param(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode push envelope")
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// New message notification for some conversation.
    ChatMessage { chat_id: String, content: String },
    /// The conversation list changed; refetch it.
    ChatUpdate,
    TypingStatus { is_typing: bool },
    /// Reply to `get_updates`. Servers that echo the conversation id let
    /// stale replies be rejected directly.
    Updates {
        #[serde(default)]
        messages: Vec<Message>,
        #[serde(default)]
        chat_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerEnvelope {
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Malformed push envelope")
    }
}
