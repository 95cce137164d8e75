//! Conversation endpoints of the chat server
//!
//! The server keys conversations by title, so a conversation's `chat_id`
//! is its title throughout this crate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use super::client::ChatClient;
use crate::error::ChatError;
use crate::format;
use crate::models::{Conversation, Message, Role, SyncCursor};
use crate::transport::UpdateSource;

// -- Response types --

#[derive(Debug, Deserialize)]
struct ConversationsResponse {
    #[serde(default)]
    conversations: Vec<WireConversation>,
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    title: String,
    #[serde(default)]
    messages: Vec<Message>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct NewChatResponse {
    chat: WireConversation,
}

/// Reply to `POST /chat/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotReply {
    pub response: String,
    pub timestamp: String,
    /// Set when the server assigned a title (e.g. for "New Chat").
    pub chat_title: Option<String>,
}

impl BotReply {
    pub fn into_message(self) -> Message {
        Message::new(Role::Bot, self.response, self.timestamp)
    }
}

/// Conversation summary for listings.
pub struct ChatInfo {
    pub conversation: Conversation,
    pub updated_at: Option<String>,
}

impl From<WireConversation> for ChatInfo {
    fn from(wire: WireConversation) -> Self {
        let conversation =
            Conversation::new(wire.title.clone(), wire.title).with_messages(wire.messages);
        Self {
            conversation,
            updated_at: wire.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Data-returning API functions
// ---------------------------------------------------------------------------

/// All conversations of the configured user.
pub async fn list_conversations_data(client: &ChatClient) -> Result<Vec<ChatInfo>> {
    let body: ConversationsResponse = client
        .get("/conversations/", &[("email", client.email())])
        .await?;
    Ok(body.conversations.into_iter().map(ChatInfo::from).collect())
}

/// One conversation by id, with its full transcript.
pub async fn find_conversation(client: &ChatClient, chat_id: &str) -> Result<Conversation> {
    list_conversations_data(client)
        .await?
        .into_iter()
        .map(|info| info.conversation)
        .find(|c| c.chat_id == chat_id)
        .ok_or_else(|| ChatError::Request(format!("Conversation not found: {}", chat_id)).into())
}

/// Messages newer than the cursor.
pub async fn fetch_updates_data(client: &ChatClient, cursor: &SyncCursor) -> Result<Vec<Message>> {
    let last_update = cursor.last_update_param();
    let body: UpdatesResponse = client
        .get(
            "/chat/updates/",
            &[
                ("email", client.email()),
                ("chat_id", cursor.chat_id.as_str()),
                ("last_update", last_update.as_str()),
            ],
        )
        .await?;
    Ok(body.messages)
}

/// Send a user message and return the bot's reply.
pub async fn send_message_with_client(
    client: &ChatClient,
    chat_id: &str,
    message: &str,
) -> Result<BotReply> {
    let body = serde_json::json!({
        "message": message,
        "email": client.email(),
        "chat_title": chat_id,
    });
    let resp = client.send_json(Method::POST, "/chat/", &body).await?;
    resp.json().await.context("Failed to parse chat response")
}

/// Create a conversation. The server picks a unique title from `title`.
pub async fn create_chat_data(client: &ChatClient, title: Option<&str>) -> Result<Conversation> {
    let body = serde_json::json!({
        "email": client.email(),
        "title": title.unwrap_or(""),
    });
    let resp = client.send_json(Method::POST, "/chat/new/", &body).await?;
    let created: NewChatResponse = resp
        .json()
        .await
        .context("Failed to parse new chat response")?;
    Ok(ChatInfo::from(created.chat).conversation)
}

/// Rename a conversation. Fails with [`ChatError::Duplicate`] if `new_title`
/// is already taken by one of `existing`.
pub async fn rename_chat_data(
    client: &ChatClient,
    existing: &[Conversation],
    old_title: &str,
    new_title: &str,
) -> Result<()> {
    check_rename(existing, old_title, new_title)?;
    let body = serde_json::json!({
        "email": client.email(),
        "old_title": old_title,
        "new_title": new_title,
    });
    client
        .send_json(Method::PUT, "/conversations/edit/", &body)
        .await?;
    Ok(())
}

fn check_rename(existing: &[Conversation], old_title: &str, new_title: &str) -> Result<()> {
    let new_title = new_title.trim();
    if new_title.is_empty() {
        return Err(ChatError::Request("Chat title cannot be empty".into()).into());
    }
    if new_title != old_title && existing.iter().any(|c| c.chat_id == new_title) {
        return Err(ChatError::Duplicate(format!("Chat title already exists: {}", new_title)).into());
    }
    Ok(())
}

pub async fn delete_chat_data(client: &ChatClient, chat_id: &str) -> Result<()> {
    let body = serde_json::json!({
        "email": client.email(),
        "chat_title": chat_id,
    });
    client
        .send_json(Method::DELETE, "/conversations/delete/", &body)
        .await?;
    Ok(())
}

#[async_trait]
impl UpdateSource for ChatClient {
    async fn fetch_updates(&self, cursor: &SyncCursor) -> Result<Vec<Message>> {
        fetch_updates_data(self, cursor).await
    }
}

// ---------------------------------------------------------------------------
// CLI printers
// ---------------------------------------------------------------------------

/// Print a message the way the CLI shows transcripts.
pub fn print_message(msg: &Message) {
    println!("[{}] {}:", msg.display_time(), msg.role.label());
    if msg.role.is_formatted() {
        print!("{}", indent(&format::to_terminal(&format::parse(&msg.content))));
    } else {
        println!("  {}", msg.content);
    }
}

fn indent(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// List conversations (prints to stdout).
pub async fn list_conversations(client: &ChatClient) -> Result<()> {
    let chats = list_conversations_data(client).await?;

    println!("\nConversations:");
    println!("{:-<60}", "");

    if chats.is_empty() {
        println!("  (no conversations)");
        return Ok(());
    }

    for chat in &chats {
        let conv = &chat.conversation;
        println!("{}", conv.name);
        println!("  Messages: {}", conv.messages.len());
        if let Some(ref updated) = chat.updated_at {
            println!("  Updated: {}", updated);
        }
        if let Some(last) = conv.last_message() {
            let preview = preview(&format::plain_text(&format::parse(&last.content)), 77);
            if !preview.is_empty() {
                println!("  [{}]: {}", last.role.label(), preview);
            }
        }
        println!();
    }

    Ok(())
}

/// Single-line preview, truncated on a char boundary.
fn preview(text: &str, max_chars: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        line
    }
}

/// Print a conversation's transcript.
pub async fn read_messages(client: &ChatClient, chat_id: &str, limit: usize) -> Result<()> {
    let conv = find_conversation(client, chat_id).await?;

    if conv.messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    let skip = conv.messages.len().saturating_sub(limit);
    for msg in &conv.messages[skip..] {
        print_message(msg);
    }

    Ok(())
}

/// Send a message and print the bot's reply.
pub async fn send_message(client: &ChatClient, chat_id: &str, message: &str) -> Result<()> {
    let reply = send_message_with_client(client, chat_id, message).await?;
    if let Some(ref title) = reply.chat_title {
        if title != chat_id {
            println!("(conversation: {})", title);
        }
    }
    print_message(&reply.into_message());
    Ok(())
}

pub async fn create_chat(client: &ChatClient, title: Option<&str>) -> Result<()> {
    let conv = create_chat_data(client, title).await?;
    println!("Created conversation: {}", conv.name);
    Ok(())
}

pub async fn rename_chat(client: &ChatClient, old_title: &str, new_title: &str) -> Result<()> {
    let existing: Vec<Conversation> = list_conversations_data(client)
        .await?
        .into_iter()
        .map(|info| info.conversation)
        .collect();
    rename_chat_data(client, &existing, old_title, new_title).await?;
    println!("Renamed '{}' to '{}'.", old_title, new_title.trim());
    Ok(())
}

pub async fn delete_chat(client: &ChatClient, chat_id: &str) -> Result<()> {
    delete_chat_data(client, chat_id).await?;
    println!("Deleted conversation: {}", chat_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversations_response_maps_title_to_id() {
        let body: ConversationsResponse = serde_json::from_str(
            r#"{"conversations":[{"title":"Chat 1","messages":[
                {"role":"user","content":"hi","timestamp":"2024-01-01T10:00:00"},
                {"role":"bot","content":"**hello**","timestamp":"2024-01-01T10:00:01.123456"}
            ],"created_at":"2024-01-01T09:00:00","updated_at":"2024-01-01T10:00:01"}]}"#,
        )
        .unwrap();
        let infos: Vec<ChatInfo> = body.conversations.into_iter().map(ChatInfo::from).collect();
        assert_eq!(infos.len(), 1);
        let conv = &infos[0].conversation;
        assert_eq!(conv.chat_id, "Chat 1");
        assert_eq!(conv.name, "Chat 1");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].role, Role::Bot);
        assert_eq!(infos[0].updated_at.as_deref(), Some("2024-01-01T10:00:01"));
    }

    #[test]
    fn test_empty_conversations_body() {
        let body: ConversationsResponse = serde_json::from_str("{}").unwrap();
        assert!(body.conversations.is_empty());
    }

    #[test]
    fn test_bot_reply_becomes_bot_message() {
        let reply: BotReply = serde_json::from_str(
            r#"{"response":"hi there","timestamp":"2024-01-01T10:00:01","chat_title":"Chat 2"}"#,
        )
        .unwrap();
        assert_eq!(reply.chat_title.as_deref(), Some("Chat 2"));
        let msg = reply.into_message();
        assert_eq!(msg, Message::new(Role::Bot, "hi there", "2024-01-01T10:00:01"));
    }

    #[test]
    fn test_new_chat_response() {
        let created: NewChatResponse = serde_json::from_str(
            r#"{"chat":{"id":"Chat 3","title":"Chat 3","messages":[]}}"#,
        )
        .unwrap();
        let conv = ChatInfo::from(created.chat).conversation;
        assert_eq!(conv.chat_id, "Chat 3");
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn test_rename_to_existing_title_is_duplicate() {
        let existing = vec![Conversation::new("Chat 1", "Chat 1"), Conversation::new("Work", "Work")];

        let err = check_rename(&existing, "Chat 1", "Work").unwrap_err();
        let chat_err = err.downcast_ref::<ChatError>().unwrap();
        assert!(chat_err.is_informational());

        assert!(check_rename(&existing, "Chat 1", "Ideas").is_ok());
        assert!(check_rename(&existing, "Chat 1", "Chat 1").is_ok());
        assert!(check_rename(&existing, "Chat 1", "   ").is_err());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("a\n  b   c", 10), "a b c");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }
}
