//! Message Composer
//!
//! Holds the draft and inserts it into the current room. The sent message is not
//! echoed locally: it shows up once the synchronizer's feed delivers it.

use std::sync::Arc;

use super::notify::Notifier;
use super::session::SessionStore;
use crate::remote::Backend;
use crate::shared::{NewMessage, Result};

/// Why `send` did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoRoom,
    NotAuthenticated,
    EmptyDraft,
}

/// Result of a send attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The insert was accepted and the draft cleared
    Sent,
    /// Preconditions not met, no remote call made
    Skipped(SkipReason),
}

pub struct MessageComposer {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    notifier: Notifier,
    draft: String,
}

impl MessageComposer {
    pub fn new(backend: Arc<dyn Backend>, session: SessionStore, notifier: Notifier) -> Self {
        Self {
            backend,
            session,
            notifier,
            draft: String::new(),
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Insert the draft into the current room.
    ///
    /// The draft is cleared only on success; a failed insert leaves it in place.
    pub async fn send(&mut self) -> Result<SendOutcome> {
        let snapshot = self.session.snapshot();
        let Some(room) = snapshot.current_room else {
            return Ok(SendOutcome::Skipped(SkipReason::NoRoom));
        };
        let Some(identity) = snapshot.identity else {
            return Ok(SendOutcome::Skipped(SkipReason::NotAuthenticated));
        };
        let content = self.draft.trim();
        if content.is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::EmptyDraft));
        }

        let message = NewMessage {
            content: content.to_string(),
            user_id: identity.id,
            email: identity.email,
            room_id: room.id,
        };
        match self.backend.insert_message(&message).await {
            Ok(()) => {
                tracing::debug!("Sent message to room {}", room.id);
                self.draft.clear();
                Ok(SendOutcome::Sent)
            }
            Err(e) => {
                tracing::error!("Failed to send message to room {}: {}", room.id, e);
                self.notifier.error(e.to_string());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for MessageComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageComposer")
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}
