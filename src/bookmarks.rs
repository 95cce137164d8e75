//! Locally bookmarked messages
//!
//! Stored as JSON in the platform data directory. Nothing is sent to the
//! server.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::models::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub chat_id: String,
    pub message: Message,
    /// RFC 3339 time the bookmark was made.
    pub bookmarked_at: String,
}

impl Bookmark {
    fn same_message(&self, chat_id: &str, message: &Message) -> bool {
        self.chat_id == chat_id && self.message.key() == message.key()
    }
}

pub struct Bookmarks {
    path: PathBuf,
    entries: Vec<Bookmark>,
}

impl Bookmarks {
    /// Default store location: `{data_dir}/bookmarks.json`.
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chat-sync", "chat-sync")
            .context("Could not determine data directory")?;
        Ok(proj_dirs.data_dir().join("bookmarks.json"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    /// Load from `path`. A missing file is an empty store.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read bookmarks file")?;
            serde_json::from_str(&content).context("Failed to parse bookmarks file")?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
        let content =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize bookmarks")?;
        fs::write(&self.path, content).context("Failed to write bookmarks file")?;
        Ok(())
    }

    /// Bookmark `message`. Bookmarking the same message twice is a
    /// [`ChatError::Duplicate`].
    pub fn add(&mut self, chat_id: &str, message: &Message) -> Result<()> {
        if self.entries.iter().any(|b| b.same_message(chat_id, message)) {
            return Err(ChatError::Duplicate("Message is already bookmarked".into()).into());
        }
        self.entries.push(Bookmark {
            chat_id: chat_id.to_string(),
            message: message.clone(),
            bookmarked_at: Utc::now().to_rfc3339(),
        });
        Ok(())
    }

    /// Remove by position in [`Bookmarks::entries`].
    pub fn remove(&mut self, index: usize) -> Result<Bookmark> {
        if index >= self.entries.len() {
            return Err(ChatError::Request(format!("No bookmark #{}", index + 1)).into());
        }
        Ok(self.entries.remove(index))
    }

    pub fn entries(&self) -> &[Bookmark] {
        &self.entries
    }
}

/// Print bookmarks, numbered from 1 (prints to stdout).
pub fn list_bookmarks(store: &Bookmarks) {
    if store.entries().is_empty() {
        println!("(no bookmarks)");
        return;
    }
    for (i, b) in store.entries().iter().enumerate() {
        let first_line = b.message.content.lines().next().unwrap_or("");
        println!(
            "{:>3}. [{}] {} {}: {}",
            i + 1,
            b.chat_id,
            b.message.display_time(),
            b.message.role.label(),
            first_line
        );
    }
}
