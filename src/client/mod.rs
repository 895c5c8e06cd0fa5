//! Client Core
//!
//! Session state and the services a chat front-end is built from:
//!
//! - **`session`** - `SessionStore`, the single source of truth for identity and
//!   current room
//! - **`auth`** - `AuthGateway` and the `AuthListener` that follows the auth feed
//! - **`rooms`** - `RoomDirectory`
//! - **`sync`** - `MessageSynchronizer`, the per-room message cache and feed
//! - **`composer`** - `MessageComposer`
//! - **`notify`** - toasts and navigation requests for the front-end
//!
//! Everything is reached through a [`ChatContext`] built once at start-up.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use talk::client::ChatContext;
//! use talk::remote::supabase::SupabaseClient;
//! use talk::shared::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let backend = Arc::new(SupabaseClient::new(config.clone()));
//! let context = ChatContext::new(&config, backend);
//!
//! let listener = context.auth().listen().await;
//! let sync = context.spawn_synchronizer();
//!
//! context.auth().sign_in("alice@talk.fr", "secret").await?;
//!
//! sync.shutdown().await;
//! listener.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod composer;
pub mod notify;
pub mod rooms;
pub mod session;
pub mod sync;

pub use auth::{AuthGateway, AuthListener};
pub use composer::{MessageComposer, SendOutcome, SkipReason};
pub use notify::Notifier;
pub use rooms::RoomDirectory;
pub use session::{SessionSnapshot, SessionStore};
pub use sync::{MessageCache, MessageSynchronizer, SyncHandle, SyncState, SyncView};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::remote::Backend;
use crate::shared::{AppConfig, UiEvent};

/// Application context: the backend, the session and the notification channel,
/// shared by every service it hands out
#[derive(Clone)]
pub struct ChatContext {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    notifier: Notifier,
    fetch_timeout: Duration,
    reset_redirect: String,
}

impl ChatContext {
    pub fn new(config: &AppConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            session: SessionStore::new(),
            notifier: Notifier::new(),
            fetch_timeout: config.fetch_timeout,
            reset_redirect: config.reset_redirect_url(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Subscribe to toasts and navigation requests
    pub fn notifications(&self) -> broadcast::Receiver<UiEvent> {
        self.notifier.subscribe()
    }

    pub fn auth(&self) -> AuthGateway {
        AuthGateway::new(
            Arc::clone(&self.backend),
            self.session.clone(),
            self.notifier.clone(),
            self.reset_redirect.clone(),
        )
    }

    pub fn rooms(&self) -> RoomDirectory {
        RoomDirectory::new(
            Arc::clone(&self.backend),
            self.session.clone(),
            self.notifier.clone(),
        )
    }

    pub fn composer(&self) -> MessageComposer {
        MessageComposer::new(
            Arc::clone(&self.backend),
            self.session.clone(),
            self.notifier.clone(),
        )
    }

    /// A synchronizer to drive by hand
    pub fn synchronizer(&self) -> MessageSynchronizer {
        MessageSynchronizer::new(
            Arc::clone(&self.backend),
            self.notifier.clone(),
            self.fetch_timeout,
        )
    }

    /// A synchronizer running in the background, following the current room
    pub fn spawn_synchronizer(&self) -> SyncHandle {
        self.synchronizer().spawn(&self.session)
    }
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext")
            .field("session", &self.session.snapshot())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}
