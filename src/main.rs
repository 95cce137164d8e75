//! chat-sync - terminal client for a bot chat server
//!
//! Keeps a conversation live over a WebSocket push channel, with HTTP
//! polling while the channel is down.

mod api;
mod bookmarks;
mod config;
mod error;
mod format;
mod models;
mod sync;
mod transport;
mod tui;
mod typing;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::ChatClient;
use crate::bookmarks::Bookmarks;
use crate::config::Config;
use crate::error::{user_message, ChatError};

#[derive(Parser)]
#[command(name = "chat-sync")]
#[command(about = "Terminal client with live updates for a bot chat server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change configuration
    Config {
        /// Email address identifying you to the server
        #[arg(long)]
        email: Option<String>,

        /// HTTP API base URL
        #[arg(long)]
        api_base: Option<String>,

        /// Push channel base URL
        #[arg(long)]
        ws_base: Option<String>,
    },

    /// List conversations
    Conversations,

    /// Read messages from a conversation
    Read {
        /// Conversation title (from `conversations` output)
        chat: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Send a message and print the reply
    Send {
        /// Conversation title
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Create a conversation
    New {
        /// Title; the server picks "Chat N" when omitted
        title: Option<String>,
    },

    /// Rename a conversation
    Rename { old: String, new: String },

    /// Delete a conversation
    Delete { chat: String },

    /// Follow a conversation live until Ctrl-C
    Watch { chat: String },

    /// Parse bot markup from a file (or stdin) and print it
    Render {
        file: Option<PathBuf>,

        /// Print the segments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage bookmarked messages
    Bookmark {
        #[command(subcommand)]
        action: BookmarkAction,
    },

    /// Launch the terminal user interface
    Tui,
}

#[derive(Subcommand)]
enum BookmarkAction {
    /// Bookmark the newest bot message of a conversation
    Add { chat: String },
    /// List bookmarks
    List,
    /// Remove a bookmark by its number in `list`
    Remove { number: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. The TUI owns the screen, so its logs go to memory.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let log_buffer = tui::LogBuffer::new();
    if matches!(cli.command, Commands::Tui) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(log_buffer.clone()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    match run(cli, log_buffer).await {
        Err(e)
            if e
                .downcast_ref::<ChatError>()
                .is_some_and(ChatError::is_informational) =>
        {
            println!("{}", user_message(&e));
            Ok(())
        }
        other => other,
    }
}

async fn run(cli: Cli, log_buffer: tui::LogBuffer) -> Result<()> {
    match cli.command {
        Commands::Config {
            email,
            api_base,
            ws_base,
        } => {
            configure(email, api_base, ws_base)?;
        }
        Commands::Conversations => {
            tracing::debug!("Fetching conversations...");
            api::list_conversations(&client()?).await?;
        }
        Commands::Read { chat, limit } => {
            api::read_messages(&client()?, &chat, limit).await?;
        }
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            api::send_message(&client()?, &to, &message).await?;
        }
        Commands::New { title } => {
            api::create_chat(&client()?, title.as_deref()).await?;
        }
        Commands::Rename { old, new } => {
            api::rename_chat(&client()?, &old, &new).await?;
        }
        Commands::Delete { chat } => {
            api::delete_chat(&client()?, &chat).await?;
        }
        Commands::Watch { chat } => {
            transport::watch(&Config::load()?, &chat).await?;
        }
        Commands::Render { file, json } => {
            render_markup(file, json)?;
        }
        Commands::Bookmark { action } => {
            bookmark(action).await?;
        }
        Commands::Tui => {
            tui::run(Config::load()?, log_buffer, cli.verbose).await?;
        }
    }

    Ok(())
}

fn client() -> Result<ChatClient> {
    ChatClient::new(&Config::load()?)
}

fn configure(
    email: Option<String>,
    api_base: Option<String>,
    ws_base: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;
    let changed = email.is_some() || api_base.is_some() || ws_base.is_some();

    if let Some(email) = email {
        config.email = Some(email.trim().to_string());
    }
    if let Some(api_base) = api_base {
        config.api_base = api_base;
    }
    if let Some(ws_base) = ws_base {
        config.ws_base = ws_base;
    }

    if changed {
        config.save()?;
        println!("Saved {}", Config::config_path()?.display());
    }

    println!("email:              {}", config.email.as_deref().unwrap_or("(not set)"));
    println!("api_base:           {}", config.api_base);
    println!("ws_base:            {}", config.ws_base);
    println!("poll_interval_ms:   {}", config.poll_interval_ms);
    println!("reconnect_delay_ms: {}", config.reconnect_delay_ms);
    println!("typing_debounce_ms: {}", config.typing_debounce_ms);
    Ok(())
}

fn render_markup(file: Option<PathBuf>, json: bool) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let segments = format::parse(&raw);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&segments).context("Failed to encode segments")?
        );
    } else {
        print!("{}", format::to_terminal(&segments));
    }
    Ok(())
}

async fn bookmark(action: BookmarkAction) -> Result<()> {
    let mut store = Bookmarks::load()?;
    tracing::debug!("Bookmarks at {}", store.path().display());
    match action {
        BookmarkAction::Add { chat } => {
            let conv = api::find_conversation(&client()?, &chat).await?;
            let message = conv
                .messages
                .iter()
                .rev()
                .find(|m| m.role.is_formatted())
                .ok_or_else(|| ChatError::Request(format!("No bot message in {}", chat)))?;
            store.add(&conv.chat_id, message)?;
            store.save()?;
            println!("Bookmarked.");
        }
        BookmarkAction::List => {
            bookmarks::list_bookmarks(&store);
        }
        BookmarkAction::Remove { number } => {
            let index = number
                .checked_sub(1)
                .ok_or_else(|| ChatError::Request("Bookmarks are numbered from 1".into()))?;
            let removed = store.remove(index)?;
            store.save()?;
            println!("Removed bookmark from {}.", removed.chat_id);
        }
    }
    Ok(())
}
