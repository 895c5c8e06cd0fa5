//! UI notifications
//!
//! Toasts and navigation requests fan out to every attached front-end.

use tokio::sync::broadcast;

use crate::shared::{AppView, UiEvent};

const NOTIFY_CAPACITY: usize = 64;

/// Broadcasts [`UiEvent`]s. Clones share the same channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    events: broadcast::Sender<UiEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// Emit an event. Nobody listening is not an error.
    pub fn notify(&self, event: UiEvent) {
        tracing::debug!("UI event: {:?}", event);
        let _ = self.events.send(event);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(UiEvent::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(UiEvent::error(message));
    }

    pub fn navigate(&self, view: AppView) {
        self.notify(UiEvent::navigate(view));
    }
}
