//! Debounced "user is typing" signal.
//!
//! Trailing-edge only: every keystroke raises the flag immediately and
//! restarts the quiet-period timer; the flag clears once a full window
//! passes with no further keystroke.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

pub struct TypingSignal {
    window: Duration,
    state: Arc<watch::Sender<bool>>,
    /// Bumped on every keystroke; a timer only clears the flag if no newer
    /// keystroke arrived while it slept.
    generation: Arc<AtomicU64>,
    pending: Option<JoinHandle<()>>,
}

impl TypingSignal {
    pub fn new(window: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            window,
            state: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
        }
    }

    /// Register a keystroke. Must be called within a tokio runtime.
    pub fn on_keystroke(&mut self) {
        self.cancel_timer();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_if_modified(|typing| !std::mem::replace(typing, true));

        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        let window = self.window;
        self.pending = Some(tokio::spawn(async move {
            time::sleep(window).await;
            state.send_if_modified(|typing| {
                if *typing && current.load(Ordering::SeqCst) == generation {
                    *typing = false;
                    true
                } else {
                    false
                }
            });
        }));
    }

    /// Clear immediately, e.g. after the message was sent.
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|typing| std::mem::replace(typing, false));
    }

    pub fn is_typing(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver that is notified only when the flag flips.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for TypingSignal {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
