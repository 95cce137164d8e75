//! Live update transport
//!
//! A WebSocket push channel carries notifications and `get_updates`
//! replies. While it is down, the same sync tick polls the HTTP API instead.

mod envelope;
mod manager;
mod socket;

use anyhow::Result;

pub use manager::{TransportEvent, TransportHandle, UpdateSource};
pub use socket::WsConnector;

use crate::api::{self, ChatClient};
use crate::config::Config;

/// Follow one conversation headless, printing state changes and new
/// messages, until Ctrl+C.
pub async fn watch(config: &Config, chat_id: &str) -> Result<()> {
    let client = ChatClient::new(config)?;
    let conversation = api::find_conversation(&client, chat_id).await?;
    println!(
        "Watching {} ({} messages so far). Ctrl+C to stop.",
        conversation.name,
        conversation.messages.len()
    );

    let mut handle = TransportHandle::spawn(
        WsConnector::new(config.push_url()?),
        client,
        config.email()?.to_string(),
        conversation,
        config.timing(),
    );

    loop {
        tokio::select! {
            event = handle.recv() => match event {
                Some(TransportEvent::StateChanged(state)) => println!("-- {}", state),
                Some(TransportEvent::Accepted { messages, .. }) => {
                    for msg in &messages {
                        api::print_message(msg);
                    }
                }
                Some(TransportEvent::ChatMessage { chat_id: other, .. }) if other != chat_id => {
                    println!("-- new message in {}", other);
                }
                Some(TransportEvent::ConversationsChanged) => println!("-- conversation list changed"),
                Some(TransportEvent::PeerTyping(true)) => println!("-- bot is typing..."),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
