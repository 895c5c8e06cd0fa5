//! Session Store
//!
//! Single source of truth for the authenticated identity and the selected room.
//! Backed by a `watch` channel: every write is visible to readers immediately and
//! subscribers are woken on change.

use std::sync::Arc;

use tokio::sync::watch;

use crate::shared::{Identity, Room};

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub current_room: Option<Room>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            identity: None,
            current_room: Some(Room::welcome()),
        }
    }
}

/// Shared handle on the session state. Clones see the same state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Signed out, with the welcome room selected
    pub fn new() -> Self {
        Self::with_snapshot(SessionSnapshot::default())
    }

    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            state: Arc::new(watch::Sender::new(snapshot)),
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    /// Replace the identity. Subscribers are only woken if it actually changed.
    pub fn set_identity(&self, identity: Option<Identity>) {
        self.state.send_if_modified(|snapshot| {
            if snapshot.identity == identity {
                return false;
            }
            tracing::info!(
                "Identity changed: {}",
                identity.as_ref().map(|i| i.email.as_str()).unwrap_or("<none>")
            );
            snapshot.identity = identity;
            true
        });
    }

    pub fn current_room(&self) -> Option<Room> {
        self.state.borrow().current_room.clone()
    }

    /// Replace the current room. Always wakes subscribers, so re-selecting the
    /// same room acts as a reload request.
    pub fn set_current_room(&self, room: Option<Room>) {
        tracing::debug!("Current room set to {:?}", room);
        self.state.send_modify(|snapshot| snapshot.current_room = room);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Watch for changes. The receiver starts with the current value marked seen.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }
}
