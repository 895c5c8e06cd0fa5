//! Remote Backend Contracts
//!
//! The hosted backend-as-a-service is an opaque collaborator. The client core only
//! talks to it through the traits in this module:
//!
//! - **`AuthApi`** - sign-up, sign-in, password reset, sign-out, session lookup and the
//!   auth-state change feed
//! - **`DataApi`** - room and message rows
//! - **`RealtimeApi`** - push feed of newly inserted messages
//!
//! [`supabase::SupabaseClient`] implements all three over HTTP and websockets. Tests
//! substitute an in-memory implementation.

pub mod supabase;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::shared::{AuthStateChange, Message, NewMessage, Result, Room, RoomId, Session};

/// How long `FeedSubscription::close` waits for the reader task to wind down
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Remote auth service
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Register a new account. A session is only returned when the service does
    /// not require email confirmation.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>>;

    /// Exchange credentials for a session
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Send a password-reset mail that links back to `redirect_to`
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()>;

    /// Set a new password for the signed-in user
    async fn update_user_password(&self, password: &str) -> Result<()>;

    /// End the current session
    async fn sign_out(&self) -> Result<()>;

    /// Current session, if any
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Establish a session from a recovery or magic link
    async fn set_session_from_url(&self, link: &str) -> Result<Session>;

    /// Subscribe to auth-state changes
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange>;
}

/// Remote row store
#[async_trait]
pub trait DataApi: Send + Sync {
    /// All rooms, oldest first
    async fn list_rooms(&self) -> Result<Vec<Room>>;

    /// Insert a room and return the stored row
    async fn insert_room(&self, name: &str) -> Result<Room>;

    /// All messages of a room, oldest first
    async fn list_messages(&self, room_id: RoomId) -> Result<Vec<Message>>;

    /// Insert a message
    async fn insert_message(&self, message: &NewMessage) -> Result<()>;
}

/// Remote change-notification feed
#[async_trait]
pub trait RealtimeApi: Send + Sync {
    /// Open a feed of insert events on the `messages` table (all rooms)
    async fn subscribe_message_inserts(&self) -> Result<FeedSubscription>;
}

/// Everything the client core needs from the backend
pub trait Backend: AuthApi + DataApi + RealtimeApi {}

impl<T> Backend for T where T: AuthApi + DataApi + RealtimeApi {}

/// Event delivered by a push feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A row was inserted into `messages`
    Insert(Message),
    /// The feed stopped and will deliver nothing more
    Closed { reason: String },
}

/// Receive side of one live push feed.
///
/// The reader task behind it owns the remote connection. `close` releases it
/// politely; dropping the handle aborts the task.
#[derive(Debug)]
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Wrap a reader task. The task must stop once `shutdown` fires.
    pub fn new(
        events: mpsc::Receiver<FeedEvent>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Next event, or `None` once the reader task is gone
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Release the remote subscription and wait for the reader task to finish
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                tracing::warn!("Feed reader did not stop in {:?}, aborting", CLOSE_GRACE);
                task.abort();
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
