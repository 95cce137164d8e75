//! API client module for the chat server

mod chat;
pub mod client;

pub use chat::{
    create_chat, create_chat_data, delete_chat, find_conversation, list_conversations,
    list_conversations_data, print_message, read_messages, rename_chat, send_message,
    send_message_with_client, BotReply,
};
pub use client::ChatClient;
