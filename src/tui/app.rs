//! TUI application state and main event loop

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::watch;

use super::backend::{Backend, BackendCommand, BackendResponse};
use super::compose::ComposeState;
use super::log_capture::LogBuffer;
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::api::ChatClient;
use crate::bookmarks::Bookmarks;
use crate::config::Config;
use crate::error::{user_message, ChatError};
use crate::models::{ConnectionState, Conversation};
use crate::transport::{TransportEvent, TransportHandle, WsConnector};
use crate::typing::TypingSignal;

/// Redraw/log refresh period (~10 fps is plenty for a chat view)
const FRAME_DURATION_MS: u64 = 100;

/// What a key press asks the event loop to do outside the app state.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Send { chat_id: String, content: String },
    Activate(Conversation),
    NewChat,
    Bookmark,
}

pub struct App {
    pub should_exit: bool,
    pub email: String,
    pub connection: ConnectionState,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    pub compose: ComposeState,
    pub typing: TypingSignal,
    pub status_message: Option<String>,
    pub status_is_error: bool,
    /// Newest captured log line, shown with `--verbose`.
    pub last_log: Option<String>,
    pub verbose: bool,
}

impl App {
    pub fn new(email: String, typing_window: Duration, verbose: bool) -> Self {
        Self {
            should_exit: false,
            email,
            connection: ConnectionState::Disconnected,
            sidebar: SidebarState {
                loading: true,
                ..SidebarState::default()
            },
            messages: MessagesState::default(),
            compose: ComposeState::default(),
            typing: TypingSignal::new(typing_window),
            status_message: None,
            status_is_error: false,
            last_log: None,
            verbose,
        }
    }

    pub fn set_status(&mut self, msg: impl Into<String>, is_error: bool) {
        self.status_message = Some(msg.into());
        self.status_is_error = is_error;
    }

    /// Report a failed user action. Informational errors are not shown in red.
    pub fn report(&mut self, err: &anyhow::Error) {
        let informational = err
            .downcast_ref::<ChatError>()
            .is_some_and(ChatError::is_informational);
        self.set_status(user_message(err), !informational);
    }

    pub fn active_chat_id(&self) -> Option<String> {
        self.sidebar.active().map(|c| c.chat_id.clone())
    }

    /// Handle a key press. Returns an action for the event loop, if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Any key dismisses a status message.
        self.status_message = None;

        match key.code {
            KeyCode::Esc => self.should_exit = true,
            KeyCode::Char('c') if ctrl => self.should_exit = true,
            KeyCode::Char('n') if ctrl => return Some(Action::NewChat),
            KeyCode::Char('b') if ctrl => return Some(Action::Bookmark),
            KeyCode::Char('u') if ctrl => {
                self.compose.clear();
                self.typing.reset();
            }
            KeyCode::Tab => return self.sidebar.cycle(1).cloned().map(Action::Activate),
            KeyCode::BackTab => return self.sidebar.cycle(-1).cloned().map(Action::Activate),
            KeyCode::Enter => return self.take_send(),
            KeyCode::Up => self.messages.scroll_up(1),
            KeyCode::Down => self.messages.scroll_down(1),
            KeyCode::PageUp => self.messages.scroll_up(10),
            KeyCode::PageDown => self.messages.scroll_down(10),
            KeyCode::Left => self.compose.move_left(),
            KeyCode::Right => self.compose.move_right(),
            KeyCode::Home => self.compose.move_home(),
            KeyCode::End => self.compose.move_end(),
            KeyCode::Backspace => {
                self.compose.backspace();
                self.typing.on_keystroke();
            }
            KeyCode::Delete => {
                self.compose.delete();
                self.typing.on_keystroke();
            }
            KeyCode::Char(c) if !ctrl => {
                self.compose.insert_char(c);
                self.typing.on_keystroke();
            }
            _ => {}
        }
        None
    }

    /// Take the compose text and append it as a pending message.
    fn take_send(&mut self) -> Option<Action> {
        let Some(chat_id) = self.active_chat_id() else {
            self.set_status("No conversation selected (C-n creates one)", true);
            return None;
        };
        let content = self.compose.take()?;
        self.typing.reset();
        self.messages.push_pending(&content);
        Some(Action::Send { chat_id, content })
    }

    /// Show `conv` in the messages pane.
    pub fn show(&mut self, conv: &Conversation) {
        self.messages.load(conv);
        self.typing.reset();
    }

    /// Copy the confirmed transcript back into the sidebar's conversation so
    /// switching away and back keeps it.
    fn store_transcript(&mut self) {
        let confirmed = self
            .messages
            .entries
            .iter()
            .filter(|e| !e.pending)
            .map(|e| e.message.clone())
            .collect();
        if let Some(conv) = self.sidebar.conversations.get_mut(self.sidebar.active) {
            conv.messages = confirmed;
        }
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) -> Option<BackendCommand> {
        match event {
            TransportEvent::StateChanged(state) => self.connection = state,
            TransportEvent::Accepted { chat_id, messages } => {
                if self.active_chat_id().as_deref() == Some(chat_id.as_str()) {
                    self.messages.apply_accepted(&messages);
                    self.store_transcript();
                }
            }
            TransportEvent::ChatMessage { chat_id, .. } => {
                if self.active_chat_id().as_deref() != Some(chat_id.as_str()) {
                    self.set_status(format!("New message in {}", chat_id), false);
                }
            }
            TransportEvent::ConversationsChanged => return Some(BackendCommand::LoadConversations),
            TransportEvent::PeerTyping(typing) => self.messages.peer_typing = typing,
        }
        None
    }

    /// Apply a backend response. Returns a conversation to activate, if the
    /// response changed which one is shown.
    pub fn on_backend_response(&mut self, resp: BackendResponse) -> Option<Conversation> {
        match resp {
            BackendResponse::Conversations(Ok(list)) => {
                let keep = self.active_chat_id();
                self.sidebar.update(list, keep.as_deref());
                let active = self.sidebar.active().cloned()?;
                if keep.as_deref() == Some(active.chat_id.as_str()) {
                    // Same conversation: merge whatever the refetch brought.
                    self.messages.apply_accepted(&active.messages);
                    self.store_transcript();
                    None
                } else {
                    Some(active)
                }
            }
            BackendResponse::Conversations(Err(e)) => {
                self.sidebar.loading = false;
                self.report(&e);
                None
            }
            BackendResponse::MessageSent {
                chat_id,
                content,
                result,
            } => {
                let active = self.active_chat_id().as_deref() == Some(chat_id.as_str());
                match result {
                    Ok(reply) => {
                        if active {
                            self.messages.apply_accepted(&[reply.into_message()]);
                            self.store_transcript();
                        }
                    }
                    Err(e) => {
                        if active {
                            self.messages.rollback_pending(&content);
                        }
                        self.compose.input = content;
                        self.compose.move_end();
                        self.report(&e);
                    }
                }
                None
            }
            BackendResponse::ChatCreated(Ok(conv)) => {
                self.store_transcript();
                self.sidebar.upsert(conv.clone());
                self.sidebar.select(&conv.chat_id);
                self.set_status(format!("Created {}", conv.name), false);
                Some(conv)
            }
            BackendResponse::ChatCreated(Err(e)) => {
                self.report(&e);
                None
            }
            BackendResponse::ClientError(msg) => {
                self.sidebar.loading = false;
                self.set_status(msg, true);
                None
            }
        }
    }

    /// Bookmark the newest bot message of the active conversation.
    pub fn bookmark_last(&mut self) {
        let Some(chat_id) = self.active_chat_id() else {
            return;
        };
        let Some(message) = self.messages.last_bot_message().cloned() else {
            self.set_status("Nothing to bookmark", false);
            return;
        };
        let result = Bookmarks::load().and_then(|mut store| {
            store.add(&chat_id, &message)?;
            store.save()
        });
        match result {
            Ok(()) => self.set_status("Bookmarked", false),
            Err(e) => self.report(&e),
        }
    }

    /// Pull captured log lines; keep the newest for the status bar.
    pub fn refresh_logs(&mut self, logs: &LogBuffer) {
        if let Some(line) = logs.drain().pop() {
            self.last_log = Some(line);
        }
    }
}

/// Run the TUI until the user quits.
pub async fn run(config: Config, logs: LogBuffer, verbose: bool) -> Result<()> {
    // Fail before touching the terminal if the config is unusable.
    let email = config.email()?.to_string();
    config.push_url()?;

    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, config, email, logs, verbose).await;
    ratatui::restore();
    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    config: Config,
    email: String,
    logs: LogBuffer,
    verbose: bool,
) -> Result<()> {
    let timing = config.timing();
    let mut app = App::new(email.clone(), timing.typing_debounce, verbose);
    let mut typing_rx: watch::Receiver<bool> = app.typing.subscribe();

    let mut backend = Backend::start(config.clone());
    backend.send(BackendCommand::LoadConversations);

    let mut transport: Option<TransportHandle> = None;
    let mut events = EventStream::new();
    let mut frame_tick = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, &app))?;

        let activate = tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) => match app.handle_key(key) {
                    Some(Action::Send { chat_id, content }) => {
                        backend.send(BackendCommand::SendMessage { chat_id, content });
                        None
                    }
                    Some(Action::Activate(conv)) => Some(conv),
                    Some(Action::NewChat) => {
                        backend.send(BackendCommand::CreateChat { title: None });
                        None
                    }
                    Some(Action::Bookmark) => {
                        app.bookmark_last();
                        None
                    }
                    None => None,
                },
                Some(Ok(_)) => None,
                Some(Err(e)) => return Err(anyhow::Error::new(e).context("Terminal input failed")),
                None => break,
            },
            Some(resp) = backend.recv() => app.on_backend_response(resp),
            Some(event) = next_event(&mut transport) => {
                if let Some(cmd) = app.on_transport_event(event) {
                    backend.send(cmd);
                }
                None
            }
            _ = typing_rx.changed() => None,
            _ = frame_tick.tick() => {
                app.refresh_logs(&logs);
                None
            }
        };

        if let Some(conv) = activate {
            app.show(&conv);
            match transport {
                Some(ref handle) => handle.switch_conversation(conv),
                None => {
                    let connector = WsConnector::new(config.push_url()?);
                    let fallback = ChatClient::new(&config)?;
                    transport = Some(TransportHandle::spawn(
                        connector,
                        fallback,
                        email.clone(),
                        conv,
                        timing,
                    ));
                }
            }
        }
    }

    if let Some(handle) = transport {
        handle.shutdown().await;
    }
    Ok(())
}

/// Next transport event; pends forever while no transport is running.
async fn next_event(transport: &mut Option<TransportHandle>) -> Option<TransportEvent> {
    match transport {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BotReply;
    use crate::models::{Message, Role};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn app_with(names: &[&str]) -> App {
        let mut app = App::new("ada@example.com".into(), Duration::from_secs(1), false);
        let list = names.iter().map(|n| Conversation::new(*n, *n)).collect();
        let first = app.on_backend_response(BackendResponse::Conversations(Ok(list)));
        if let Some(conv) = first {
            app.show(&conv);
        }
        app
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_sends_optimistically() {
        let mut app = app_with(&["Chat 1"]);
        type_text(&mut app, "hello");
        assert!(app.typing.is_typing());

        let action = app.handle_key(key(KeyCode::Enter));
        assert_eq!(
            action,
            Some(Action::Send {
                chat_id: "Chat 1".into(),
                content: "hello".into()
            })
        );
        assert!(!app.typing.is_typing());
        assert!(app.compose.input.is_empty());
        assert!(app.messages.entries[0].pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_rolls_back_and_restores_input() {
        let mut app = app_with(&["Chat 1"]);
        type_text(&mut app, "hello");
        app.handle_key(key(KeyCode::Enter));

        app.on_backend_response(BackendResponse::MessageSent {
            chat_id: "Chat 1".into(),
            content: "hello".into(),
            result: Err(ChatError::Request("Server error. Please try again.".into()).into()),
        });

        assert!(app.messages.entries.is_empty());
        assert_eq!(app.compose.input, "hello");
        assert_eq!(
            app.status_message.as_deref(),
            Some("Server error. Please try again.")
        );
        assert!(app.status_is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_and_later_echo_do_not_duplicate() {
        let mut app = app_with(&["Chat 1"]);
        type_text(&mut app, "hi");
        app.handle_key(key(KeyCode::Enter));

        let reply = BotReply {
            response: "hello!".into(),
            timestamp: "2024-01-01T10:00:01".into(),
            chat_title: Some("Chat 1".into()),
        };
        app.on_backend_response(BackendResponse::MessageSent {
            chat_id: "Chat 1".into(),
            content: "hi".into(),
            result: Ok(reply),
        });

        // The push channel later delivers both stored messages.
        app.on_transport_event(TransportEvent::Accepted {
            chat_id: "Chat 1".into(),
            messages: vec![
                Message::new(Role::User, "hi", "2024-01-01T10:00:00"),
                Message::new(Role::Bot, "hello!", "2024-01-01T10:00:01"),
            ],
        });

        let contents: Vec<(&str, bool)> = app
            .messages
            .entries
            .iter()
            .map(|e| (e.message.content.as_str(), e.pending))
            .collect();
        assert_eq!(contents, vec![("hi", false), ("hello!", false)]);
        assert_eq!(app.sidebar.active().map(|c| c.messages.len()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_cycles_conversations() {
        let mut app = app_with(&["A", "B"]);
        match app.handle_key(key(KeyCode::Tab)) {
            Some(Action::Activate(conv)) => assert_eq!(conv.chat_id, "B"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(app.active_chat_id().as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_other_conversations() {
        let mut app = app_with(&["A", "B"]);
        app.on_transport_event(TransportEvent::Accepted {
            chat_id: "B".into(),
            messages: vec![Message::new(Role::Bot, "x", "2024-01-01T10:00:00")],
        });
        assert!(app.messages.entries.is_empty());

        app.on_transport_event(TransportEvent::ChatMessage {
            chat_id: "B".into(),
            content: "x".into(),
        });
        assert_eq!(app.status_message.as_deref(), Some("New message in B"));

        assert!(matches!(
            app.on_transport_event(TransportEvent::ConversationsChanged),
            Some(BackendCommand::LoadConversations)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_keys() {
        let mut app = app_with(&[]);
        assert_eq!(app.handle_key(ctrl('n')), Some(Action::NewChat));
        assert!(!app.should_exit);
        app.handle_key(ctrl('c'));
        assert!(app.should_exit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_conversation_reports() {
        let mut app = app_with(&[]);
        type_text(&mut app, "hello");
        assert_eq!(app.handle_key(key(KeyCode::Enter)), None);
        assert!(app.status_is_error);
        assert_eq!(app.compose.input, "hello");
    }
}
