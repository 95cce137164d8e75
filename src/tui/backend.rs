//! Async backend: runs HTTP requests for the TUI event loop.
//!
//! Uses an mpsc channel pair. The TUI sends `BackendCommand` values, and a
//! background tokio task executes them and sends `BackendResponse` values back.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::api::{self, BotReply, ChatClient};
use crate::config::Config;
use crate::models::Conversation;

/// Commands sent from the TUI event loop to the async backend.
#[derive(Debug)]
pub enum BackendCommand {
    LoadConversations,
    SendMessage { chat_id: String, content: String },
    CreateChat { title: Option<String> },
}

/// Responses from the async backend to the TUI.
pub enum BackendResponse {
    Conversations(Result<Vec<Conversation>>),
    /// Outcome of a send. `content` identifies the optimistic entry.
    MessageSent {
        chat_id: String,
        content: String,
        result: Result<BotReply>,
    },
    ChatCreated(Result<Conversation>),
    /// Client creation failed (e.g. no email configured).
    ClientError(String),
}

/// Handle for interacting with the backend from the TUI side.
pub struct Backend {
    cmd_tx: mpsc::UnboundedSender<BackendCommand>,
    resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
}

impl Backend {
    /// Start the backend. Spawns a tokio task that processes commands.
    pub fn start(config: Config) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();

        tokio::spawn(backend_loop(config, cmd_rx, resp_tx));

        Self { cmd_tx, resp_rx }
    }

    /// Send a command to the backend (non-blocking).
    pub fn send(&self, cmd: BackendCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Backend channel closed -- command dropped");
        }
    }

    /// Receive a response from the backend.
    ///
    /// Returns `None` only when the backend has exited.
    /// Designed to be used inside `tokio::select!`.
    pub async fn recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.recv().await
    }
}

/// Background loop that processes commands.
///
/// Creates a ChatClient once and reuses it across all API calls.
/// If client creation fails, sends a ClientError response and exits.
async fn backend_loop(
    config: Config,
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    resp_tx: mpsc::UnboundedSender<BackendResponse>,
) {
    let client = match ChatClient::new(&config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            let _ = resp_tx.send(BackendResponse::ClientError(format!("{:#}", e)));
            return;
        }
    };

    while let Some(cmd) = cmd_rx.recv().await {
        let client = Arc::clone(&client);
        let resp_tx = resp_tx.clone();

        // Spawn each command as a separate task so we don't block the loop.
        tokio::spawn(async move {
            let response = match cmd {
                BackendCommand::LoadConversations => {
                    let result = api::list_conversations_data(&client)
                        .await
                        .map(|infos| infos.into_iter().map(|i| i.conversation).collect());
                    BackendResponse::Conversations(result)
                }
                BackendCommand::SendMessage { chat_id, content } => {
                    let result = api::send_message_with_client(&client, &chat_id, &content).await;
                    BackendResponse::MessageSent {
                        chat_id,
                        content,
                        result,
                    }
                }
                BackendCommand::CreateChat { title } => {
                    let result = api::create_chat_data(&client, title.as_deref()).await;
                    BackendResponse::ChatCreated(result)
                }
            };
            let _ = resp_tx.send(response);
        });
    }
}
