//! Error taxonomy for chat operations
//!
//! Application plumbing uses `anyhow`; these variants are attached to it so
//! callers can tell the classes apart with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Push channel closed or unreachable. Recovered by reconnect/fallback.
    #[error("connection unavailable: {0}")]
    Transport(String),

    /// A specific request was rejected. Shown to the user.
    #[error("{0}")]
    Request(String),

    /// The operation was already done (e.g. bookmarking twice). Informational.
    #[error("{0}")]
    Duplicate(String),
}

impl ChatError {
    /// Whether this should be reported as a notice rather than a failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, ChatError::Duplicate(_))
    }
}

/// Display string for a failed user action, as shown in the UI.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ChatError>() {
        Some(e) => e.to_string(),
        None => format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_taxonomy() {
        let err = anyhow::Error::new(ChatError::Request("Conversation not found".into()))
            .context("POST /chat/ failed");
        assert_eq!(user_message(&err), "Conversation not found");

        let err = anyhow::anyhow!("plain failure");
        assert_eq!(user_message(&err), "plain failure");
    }

    #[test]
    fn test_duplicate_is_informational() {
        assert!(ChatError::Duplicate("x".into()).is_informational());
        assert!(!ChatError::Request("x".into()).is_informational());
    }
}
