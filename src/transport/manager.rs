//! Push/pull transport state machine.
//!
//! One task owns the push socket, the sync tick, the reconnect deadline and
//! the active [`Session`]. It is driven by [`ManagerCommand`]s from the UI
//! and by frames from the socket, and reports upward as [`TransportEvent`]s.
//!
//! Every tick asks for updates: over the socket when connected, otherwise
//! through the HTTP fallback. Both paths feed the same reconciler.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::envelope::{ClientEnvelope, ServerEnvelope};
use super::socket::{PushConnector, PushSocket};
use crate::config::Timing;
use crate::models::{ConnectionState, Conversation, Message, SyncCursor};
use crate::sync::Session;

/// Pull path used while the push channel is down.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    async fn fetch_updates(&self, cursor: &SyncCursor) -> Result<Vec<Message>>;
}

/// Commands from the UI to the manager task.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Make another conversation active.
    Switch(Conversation),
    Shutdown,
}

/// Notifications from the manager task to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    /// Messages that were new to the active conversation.
    Accepted {
        chat_id: String,
        messages: Vec<Message>,
    },
    ChatMessage {
        chat_id: String,
        content: String,
    },
    ConversationsChanged,
    PeerTyping(bool),
}

/// Owning handle to a running manager task.
///
/// Dropping the handle aborts the task, which drops the socket and every
/// timer with it.
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn spawn<C, F>(
        connector: C,
        fallback: F,
        email: String,
        conversation: Conversation,
        timing: Timing,
    ) -> Self
    where
        C: PushConnector,
        F: UpdateSource,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = Manager {
            connector: Arc::new(connector),
            fallback,
            email,
            timing,
            session: Session::new(conversation),
            state: ConnectionState::Disconnected,
            socket: None,
            outstanding: 0,
            stale: 0,
            reconnect_at: None,
            events: event_tx,
        };
        let task = tokio::spawn(manager.run(cmd_rx));

        Self {
            commands: cmd_tx,
            events: event_rx,
            task: Some(task),
        }
    }

    /// Make `conversation` active. Pending replies for the old one are dropped.
    pub fn switch_conversation(&self, conversation: Conversation) {
        if self.commands.send(ManagerCommand::Switch(conversation)).is_err() {
            tracing::error!("Transport task gone -- switch dropped");
        }
    }

    /// Next event. Designed to be used inside `tokio::select!`.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Close the channel and wait for the task to finish its teardown.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(ManagerCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Transport task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// An in-flight connect attempt.
type Attempt<S> = Pin<Box<dyn Future<Output = Result<S>> + Send>>;

struct Manager<C: PushConnector, F> {
    connector: Arc<C>,
    fallback: F,
    email: String,
    timing: Timing,
    session: Session,
    state: ConnectionState,
    socket: Option<C::Socket>,
    /// `get_updates` requests sent on the current socket without a reply.
    outstanding: usize,
    /// Replies still owed for a conversation that is no longer active.
    stale: usize,
    reconnect_at: Option<Instant>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl<C: PushConnector, F: UpdateSource> Manager<C, F> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ManagerCommand>) {
        let mut tick = time::interval(self.timing.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await; // skip first immediate tick

        // Connect attempts run as their own branch.
        let mut connecting = Some(self.connect());

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(ManagerCommand::Switch(conversation)) => self.switch(conversation).await,
                    Some(ManagerCommand::Shutdown) | None => break,
                },
                attempt = next_attempt(&mut connecting) => {
                    connecting = None;
                    self.on_attempt(attempt).await;
                }
                frame = next_frame(&mut self.socket) => self.on_frame(frame).await,
                _ = tick.tick() => self.on_tick().await,
                _ = wait_until(reconnect_at) => {
                    self.reconnect_at = None;
                    connecting = Some(self.connect());
                }
            }
        }

        drop(connecting);
        self.teardown().await;
    }

    fn connect(&mut self) -> Attempt<C::Socket> {
        self.set_state(ConnectionState::Connecting);
        let connector = Arc::clone(&self.connector);
        Box::pin(async move { connector.connect().await })
    }

    async fn on_attempt(&mut self, attempt: Result<C::Socket>) {
        match attempt {
            Ok(socket) => {
                self.socket = Some(socket);
                self.outstanding = 0;
                self.stale = 0;
                self.set_state(ConnectionState::Connected);
                self.subscribe().await;
            }
            Err(e) => {
                tracing::warn!(
                    "Push channel unavailable: {:#}. Retrying in {:?}",
                    e,
                    self.timing.reconnect_delay
                );
                self.set_state(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    async fn subscribe(&mut self) {
        let envelope = ClientEnvelope::subscribe(self.session.chat_id(), &self.email);
        self.send(&envelope).await;
    }

    /// Send on the socket if there is one. A failed send drops the connection.
    async fn send(&mut self, envelope: &ClientEnvelope) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        let result = socket.send(envelope).await;
        match result {
            Ok(()) => true,
            Err(e) => {
                self.drop_connection(&format!("{:#}", e)).await;
                false
            }
        }
    }

    async fn on_frame(&mut self, frame: Result<Option<ServerEnvelope>>) {
        match frame {
            Ok(Some(envelope)) => self.on_envelope(envelope),
            Ok(None) => self.drop_connection("closed by server").await,
            Err(e) => self.drop_connection(&format!("{:#}", e)).await,
        }
    }

    fn on_envelope(&mut self, envelope: ServerEnvelope) {
        match envelope {
            ServerEnvelope::Updates { messages, chat_id } => {
                self.outstanding = self.outstanding.saturating_sub(1);
                match chat_id {
                    // A tagged reply is judged by its id alone.
                    Some(id) if id != self.session.chat_id() => {
                        tracing::debug!("Discarding update reply for {}", id);
                        return;
                    }
                    Some(_) => {}
                    None if self.stale > 0 => {
                        self.stale -= 1;
                        tracing::debug!("Discarding update reply for previous conversation");
                        return;
                    }
                    None => {}
                }
                self.deliver(&messages);
            }
            ServerEnvelope::ChatMessage { chat_id, content } => {
                self.emit(TransportEvent::ChatMessage { chat_id, content });
            }
            ServerEnvelope::ChatUpdate => self.emit(TransportEvent::ConversationsChanged),
            ServerEnvelope::TypingStatus { is_typing } => {
                self.emit(TransportEvent::PeerTyping(is_typing));
            }
            ServerEnvelope::Unknown => {
                tracing::debug!("Ignoring push envelope of unknown type");
            }
        }
    }

    async fn on_tick(&mut self) {
        if self.state.is_connected() {
            let envelope = ClientEnvelope::get_updates(self.session.cursor(), &self.email);
            if self.send(&envelope).await {
                self.outstanding += 1;
            }
            return;
        }

        let cursor = self.session.cursor().clone();
        let polled = self.fallback.fetch_updates(&cursor).await;
        match polled {
            Ok(batch) => self.deliver(&batch),
            Err(e) => tracing::debug!("Fallback poll failed: {:#}", e),
        }
    }

    async fn switch(&mut self, conversation: Conversation) {
        tracing::info!("Switching to conversation {}", conversation.chat_id);
        self.stale = self.outstanding;
        self.session = Session::new(conversation);
        if self.socket.is_some() {
            self.subscribe().await;
        }
    }

    fn deliver(&mut self, batch: &[Message]) {
        let accepted = self.session.apply(batch);
        if !accepted.is_empty() {
            self.emit(TransportEvent::Accepted {
                chat_id: self.session.chat_id().to_string(),
                messages: accepted,
            });
        }
    }

    async fn drop_connection(&mut self, reason: &str) {
        tracing::warn!("Push channel lost: {}", reason);
        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }
        self.outstanding = 0;
        self.stale = 0;
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    /// At most one reconnect is ever pending.
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_none() {
            self.reconnect_at = Some(Instant::now() + self.timing.reconnect_delay);
        }
    }

    async fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("Transport stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::info!("Push channel: {} -> {}", self.state, state);
            self.state = state;
            self.emit(TransportEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: TransportEvent) {
        // The UI may already be gone during teardown.
        let _ = self.events.send(event);
    }
}

async fn next_frame<S: PushSocket>(socket: &mut Option<S>) -> Result<Option<ServerEnvelope>> {
    match socket {
        Some(socket) => socket.recv().await,
        None => pending().await,
    }
}

async fn next_attempt<S>(attempt: &mut Option<Attempt<S>>) -> Result<S> {
    match attempt {
        Some(attempt) => attempt.as_mut().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Inbound = mpsc::UnboundedSender<Result<Option<ServerEnvelope>>>;

    struct FakeSocket {
        sent: Arc<Mutex<Vec<ClientEnvelope>>>,
        inbound: mpsc::UnboundedReceiver<Result<Option<ServerEnvelope>>>,
    }

    #[async_trait]
    impl PushSocket for FakeSocket {
        async fn send(&mut self, envelope: &ClientEnvelope) -> Result<()> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<ServerEnvelope>> {
            match self.inbound.recv().await {
                Some(frame) => frame,
                None => Ok(None),
            }
        }

        async fn close(&mut self) {}
    }

    /// Hands out scripted sockets; fails once the script runs out.
    #[derive(Clone, Default)]
    struct FakeConnector {
        script: Arc<Mutex<VecDeque<FakeSocket>>>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    impl FakeConnector {
        fn with_sockets(n: usize, sent: &Arc<Mutex<Vec<ClientEnvelope>>>) -> (Self, Vec<Inbound>) {
            let connector = Self::default();
            let mut senders = Vec::new();
            for _ in 0..n {
                let (tx, rx) = mpsc::unbounded_channel();
                connector.script.lock().unwrap().push_back(FakeSocket {
                    sent: Arc::clone(sent),
                    inbound: rx,
                });
                senders.push(tx);
            }
            (connector, senders)
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushConnector for FakeConnector {
        type Socket = FakeSocket;

        async fn connect(&self) -> Result<FakeSocket> {
            self.attempts.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    #[derive(Clone, Default)]
    struct FakeFallback {
        batches: Arc<Mutex<VecDeque<Vec<Message>>>>,
        calls: Arc<Mutex<Vec<SyncCursor>>>,
    }

    #[async_trait]
    impl UpdateSource for FakeFallback {
        async fn fetch_updates(&self, cursor: &SyncCursor) -> Result<Vec<Message>> {
            self.calls.lock().unwrap().push(cursor.clone());
            Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn timing() -> Timing {
        Timing {
            poll_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(3),
            typing_debounce: Duration::from_secs(1),
        }
    }

    fn conversation(id: &str) -> Conversation {
        Conversation::new(id, id)
    }

    fn msg(content: &str, ts: &str) -> Message {
        Message::new(Role::Bot, content, ts)
    }

    async fn next_state(handle: &mut TransportHandle) -> ConnectionState {
        loop {
            if let Some(TransportEvent::StateChanged(s)) = handle.recv().await {
                return s;
            }
        }
    }

    async fn next_accepted(handle: &mut TransportHandle) -> (String, Vec<Message>) {
        loop {
            if let Some(TransportEvent::Accepted { chat_id, messages }) = handle.recv().await {
                return (chat_id, messages);
            }
        }
    }

    /// Poll `cond` on the paused clock until it holds.
    async fn wait_for(mut cond: impl FnMut() -> bool) {
        while !cond() {
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_subscribes_to_active_conversation() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, _inbound) = FakeConnector::with_sockets(1, &sent);
        let mut handle = TransportHandle::spawn(
            connector,
            FakeFallback::default(),
            "ada@example.com".into(),
            conversation("Chat 1"),
            timing(),
        );

        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);
        assert_eq!(
            sent.lock().unwrap()[0],
            ClientEnvelope::subscribe("Chat 1", "ada@example.com")
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_sends_get_updates_and_reconciles_reply() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, inbound) = FakeConnector::with_sockets(1, &sent);
        let fallback = FakeFallback::default();
        let mut handle = TransportHandle::spawn(
            connector,
            fallback.clone(),
            "ada@example.com".into(),
            conversation("Chat 1"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);

        let sent_probe = Arc::clone(&sent);
        wait_for(|| {
            sent_probe
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, ClientEnvelope::GetUpdates { .. }))
        })
        .await;

        let batch = vec![msg("a", "2024-01-01T00:00:00"), msg("b", "2024-01-01T00:00:01")];
        let reply = ServerEnvelope::Updates {
            messages: batch.clone(),
            chat_id: None,
        };
        inbound[0].send(Ok(Some(reply.clone()))).unwrap();
        assert_eq!(next_accepted(&mut handle).await, ("Chat 1".to_string(), batch));

        // A replay of the same batch is absorbed silently; the next event
        // is only the reply carrying something new.
        inbound[0].send(Ok(Some(reply))).unwrap();
        let fresh = vec![msg("c", "2024-01-01T00:00:02")];
        inbound[0]
            .send(Ok(Some(ServerEnvelope::Updates {
                messages: fresh.clone(),
                chat_id: Some("Chat 1".into()),
            })))
            .unwrap();
        assert_eq!(next_accepted(&mut handle).await, ("Chat 1".to_string(), fresh));

        // The push path was used; the fallback never ran.
        assert!(fallback.calls.lock().unwrap().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_once_after_fixed_delay() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, inbound) = FakeConnector::with_sockets(2, &sent);
        let mut handle = TransportHandle::spawn(
            connector.clone(),
            FakeFallback::default(),
            "ada@example.com".into(),
            conversation("Chat 1"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);
        assert_eq!(connector.attempts().len(), 1);

        inbound[0].send(Ok(None)).unwrap();
        assert_eq!(next_state(&mut handle).await, ConnectionState::Disconnected);
        let closed_at = Instant::now();

        time::sleep(Duration::from_millis(2990)).await;
        assert_eq!(connector.attempts().len(), 1, "reconnected before the delay");

        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2);
        let gap = attempts[1] - closed_at;
        assert!(gap >= Duration::from_secs(3) && gap < Duration::from_millis(3010));

        // Re-subscribed on the new socket.
        let subscribes = sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ClientEnvelope::Subscribe { .. }))
            .count();
        assert_eq!(subscribes, 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_polls_fallback_and_retries() {
        let connector = FakeConnector::default();
        let fallback = FakeFallback::default();
        let batch = vec![msg("x", "2024-01-01T00:00:00"), msg("y", "2024-01-01T00:00:01")];
        {
            let mut batches = fallback.batches.lock().unwrap();
            batches.push_back(batch.clone());
            batches.push_back(batch.clone());
        }
        let mut handle = TransportHandle::spawn(
            connector.clone(),
            fallback.clone(),
            "ada@example.com".into(),
            conversation("Chat 7"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Disconnected);

        assert_eq!(next_accepted(&mut handle).await, ("Chat 7".to_string(), batch));

        let calls = Arc::clone(&fallback.calls);
        wait_for(|| calls.lock().unwrap().len() >= 2).await;
        assert!(calls.lock().unwrap().iter().all(|c| c.chat_id == "Chat 7"));

        // One retry per delay, not one per tick.
        time::sleep(Duration::from_secs(2)).await;
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2);
        let gap = attempts[1] - attempts[0];
        assert!(gap >= Duration::from_secs(3) && gap < Duration::from_millis(3010));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_discards_stale_replies() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, inbound) = FakeConnector::with_sockets(1, &sent);
        let mut handle = TransportHandle::spawn(
            connector,
            FakeFallback::default(),
            "ada@example.com".into(),
            conversation("A"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);

        let probe = Arc::clone(&sent);
        wait_for(|| {
            probe
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, ClientEnvelope::GetUpdates { chat_id, .. } if chat_id == "A"))
        })
        .await;

        handle.switch_conversation(conversation("B"));
        let probe = Arc::clone(&sent);
        wait_for(|| {
            probe
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, ClientEnvelope::Subscribe { chat_id, .. } if chat_id == "B"))
        })
        .await;

        // Reply to the request made for A arrives after the switch.
        inbound[0]
            .send(Ok(Some(ServerEnvelope::Updates {
                messages: vec![msg("for A", "2024-01-01T00:00:00")],
                chat_id: None,
            })))
            .unwrap();

        let probe = Arc::clone(&sent);
        wait_for(|| {
            probe
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, ClientEnvelope::GetUpdates { chat_id, .. } if chat_id == "B"))
        })
        .await;

        let for_b = vec![msg("for B", "2024-01-01T00:00:05")];
        inbound[0]
            .send(Ok(Some(ServerEnvelope::Updates {
                messages: for_b.clone(),
                chat_id: None,
            })))
            .unwrap();

        assert_eq!(next_accepted(&mut handle).await, ("B".to_string(), for_b));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tagged_reply_for_new_conversation_survives_switch() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, inbound) = FakeConnector::with_sockets(1, &sent);
        let mut handle = TransportHandle::spawn(
            connector,
            FakeFallback::default(),
            "ada@example.com".into(),
            conversation("A"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);

        // Three requests for A that the server never answers.
        let probe = Arc::clone(&sent);
        wait_for(|| {
            probe
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, ClientEnvelope::GetUpdates { chat_id, .. } if chat_id == "A"))
                .count()
                >= 3
        })
        .await;

        handle.switch_conversation(conversation("B"));
        let probe = Arc::clone(&sent);
        wait_for(|| {
            probe
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, ClientEnvelope::Subscribe { chat_id, .. } if chat_id == "B"))
        })
        .await;

        inbound[0]
            .send(Ok(Some(ServerEnvelope::Updates {
                messages: vec![msg("late for A", "2024-01-01T00:00:00")],
                chat_id: Some("A".into()),
            })))
            .unwrap();
        let for_b = vec![msg("for B", "2024-01-01T00:00:05")];
        inbound[0]
            .send(Ok(Some(ServerEnvelope::Updates {
                messages: for_b.clone(),
                chat_id: Some("B".into()),
            })))
            .unwrap();

        assert_eq!(next_accepted(&mut handle).await, ("B".to_string(), for_b));
        handle.shutdown().await;
    }

    /// Never finishes a handshake.
    struct StalledConnector;

    #[async_trait]
    impl PushConnector for StalledConnector {
        type Socket = FakeSocket;

        async fn connect(&self) -> Result<FakeSocket> {
            pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handshake_keeps_polling_and_obeys_commands() {
        let fallback = FakeFallback::default();
        let mut handle = TransportHandle::spawn(
            StalledConnector,
            fallback.clone(),
            "ada@example.com".into(),
            conversation("A"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);

        time::sleep(Duration::from_millis(10_500)).await;
        assert!(fallback.calls.lock().unwrap().len() >= 9);

        handle.switch_conversation(conversation("B"));
        let calls = Arc::clone(&fallback.calls);
        wait_for(|| calls.lock().unwrap().iter().any(|c| c.chat_id == "B")).await;

        tokio_test::assert_ok!(time::timeout(Duration::from_secs(1), handle.shutdown()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_notifications_are_forwarded() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, inbound) = FakeConnector::with_sockets(1, &sent);
        let mut handle = TransportHandle::spawn(
            connector,
            FakeFallback::default(),
            "ada@example.com".into(),
            conversation("A"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);

        inbound[0].send(Ok(Some(ServerEnvelope::Unknown))).unwrap();
        inbound[0]
            .send(Ok(Some(ServerEnvelope::TypingStatus { is_typing: true })))
            .unwrap();
        inbound[0].send(Ok(Some(ServerEnvelope::ChatUpdate))).unwrap();

        assert_eq!(handle.recv().await, Some(TransportEvent::PeerTyping(true)));
        assert_eq!(
            handle.recv().await,
            Some(TransportEvent::ConversationsChanged)
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_disconnected_and_stops() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (connector, _inbound) = FakeConnector::with_sockets(1, &sent);
        let mut handle = TransportHandle::spawn(
            connector,
            FakeFallback::default(),
            "ada@example.com".into(),
            conversation("A"),
            timing(),
        );
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut handle).await, ConnectionState::Connected);

        handle.commands.send(ManagerCommand::Shutdown).unwrap();
        assert_eq!(next_state(&mut handle).await, ConnectionState::Disconnected);
        // The task dropped its event sender on exit.
        assert_eq!(handle.recv().await, None);
    }
}
