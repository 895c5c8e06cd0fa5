//! Room Directory

use std::sync::Arc;

use super::notify::Notifier;
use super::session::SessionStore;
use crate::remote::Backend;
use crate::shared::{AppView, Result, Room, TalkError};

/// Lists, creates and selects rooms
#[derive(Clone)]
pub struct RoomDirectory {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    notifier: Notifier,
}

impl RoomDirectory {
    pub fn new(backend: Arc<dyn Backend>, session: SessionStore, notifier: Notifier) -> Self {
        Self {
            backend,
            session,
            notifier,
        }
    }

    /// All rooms, oldest first. Fetched fresh on every call.
    pub async fn list_rooms(&self) -> Result<Vec<Room>> {
        self.backend.list_rooms().await.map_err(|e| {
            tracing::error!("Failed to list rooms: {}", e);
            self.notifier
                .error(format!("Erreur de chargement des salons: {}", e));
            e
        })
    }

    /// Create a room, make it current and go back to the conversation view.
    ///
    /// On failure nothing changes locally, so the caller can keep the name and retry.
    pub async fn create_room(&self, name: &str) -> Result<Room> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TalkError::validation("name", "Le nom du salon est requis"));
        }

        match self.backend.insert_room(name).await {
            Ok(room) => {
                tracing::info!("Created room {} ({})", room.id, room.name);
                self.session.set_current_room(Some(room.clone()));
                self.notifier.navigate(AppView::ChatRoom);
                Ok(room)
            }
            Err(e) => {
                tracing::error!("Failed to create room {:?}: {}", name, e);
                self.notifier.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Make `room` current and show its conversation
    pub fn join_room(&self, room: Room) {
        tracing::info!("Joining room {} ({})", room.id, room.name);
        self.session.set_current_room(Some(room));
        self.notifier.navigate(AppView::ChatRoom);
    }

    /// Deselect the current room
    pub fn leave_room(&self) {
        self.session.set_current_room(None);
    }
}

impl std::fmt::Debug for RoomDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomDirectory").finish_non_exhaustive()
    }
}
