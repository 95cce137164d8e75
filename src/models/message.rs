//! Message-related models

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Bot,
    Admin,
}

impl From<String> for Role {
    /// Unknown roles are server-authored content; render them like bot output.
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "admin" => Role::Admin,
            _ => Role::Bot,
        }
    }
}

impl Role {
    /// Label shown next to a message in the transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Bot => "Bot",
            Role::Admin => "Admin",
        }
    }

    /// Whether the body should be run through the segment parser.
    pub fn is_formatted(&self) -> bool {
        !matches!(self, Role::User)
    }
}

/// Chat message as exchanged with the server.
///
/// The timestamp is kept as the server's wire string so it round-trips
/// unchanged in update requests and bookmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

/// Identity used when deduplicating messages: content plus timestamp.
///
/// Role is deliberately not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    content: String,
    stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Stamp {
    Instant(DateTime<Utc>),
    Raw(String),
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Create a message stamped with the current UTC time.
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self::new(
            role,
            content,
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }

    /// Parse the timestamp as an instant.
    ///
    /// Accepts RFC 3339 as well as naive ISO-8601 (no offset), which is
    /// interpreted as UTC.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        parse_instant(&self.timestamp)
    }

    /// Deduplication key. Equivalent instants compare equal even when their
    /// wire representations differ.
    pub fn key(&self) -> MessageKey {
        let stamp = match self.instant() {
            Some(t) => Stamp::Instant(t),
            None => Stamp::Raw(self.timestamp.clone()),
        };
        MessageKey {
            content: self.content.clone(),
            stamp,
        }
    }

    /// Short local time for display ("14:05"), or the raw timestamp.
    pub fn display_time(&self) -> String {
        match self.instant() {
            Some(t) => t.with_timezone(&Local).format("%H:%M").to_string(),
            None => self.timestamp.clone(),
        }
    }
}

/// Lenient ISO-8601 parsing: RFC 3339, or naive timestamps taken as UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
