//! Synchronization state shared by the transport and the reconciler

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Per-conversation watermark: "caught up to `last_update`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub chat_id: String,
    pub last_update: DateTime<Utc>,
}

impl SyncCursor {
    /// Cursor for a conversation that was just loaded.
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self::at(chat_id, Utc::now())
    }

    pub fn at(chat_id: impl Into<String>, last_update: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.into(),
            last_update,
        }
    }

    /// Wire form of `last_update` used by both the push and pull paths.
    pub fn last_update_param(&self) -> String {
        self.last_update
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Push channel connection state. Cyclic; there is no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "offline (polling)",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "live",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
