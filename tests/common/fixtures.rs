//! Test fixtures

use std::sync::Arc;
use std::time::Duration;

use talk::client::{ChatContext, MessageSynchronizer, Notifier};
use talk::remote::Backend;
use talk::shared::{AppConfig, Identity, Message, MessageId, RoomId};

use super::fake_backend::{timestamp, FakeBackend};

pub const ALICE_EMAIL: &str = "alice@talk.fr";
pub const ALICE_PASSWORD: &str = "motdepasse";

/// Configuration pointing nowhere; the fake backend ignores it
pub fn test_config() -> AppConfig {
    AppConfig::builder()
        .backend_url("http://localhost:54321")
        .anon_key("test-anon-key")
        .site_url("http://localhost:5173")
        .fetch_timeout(Duration::from_secs(2))
        .persist_session(false)
        .build()
        .expect("valid test config")
}

/// A fake backend with Alice registered, and a context over it
pub fn context() -> (Arc<FakeBackend>, ChatContext) {
    let backend = Arc::new(FakeBackend::new().with_user(ALICE_EMAIL, ALICE_PASSWORD));
    let context = ChatContext::new(&test_config(), backend.clone() as Arc<dyn Backend>);
    (backend, context)
}

/// A synchronizer over `backend` with a short fetch bound
pub fn synchronizer(backend: &Arc<FakeBackend>, fetch_timeout: Duration) -> MessageSynchronizer {
    MessageSynchronizer::new(
        backend.clone() as Arc<dyn Backend>,
        Notifier::new(),
        fetch_timeout,
    )
}

pub fn message(id: MessageId, room_id: RoomId, content: &str) -> Message {
    Message {
        id,
        content: content.to_string(),
        user_id: "user-9".to_string(),
        email: "bob@talk.fr".to_string(),
        created_at: timestamp(id),
        room_id,
    }
}

pub fn ids(messages: &[Message]) -> Vec<MessageId> {
    messages.iter().map(|m| m.id).collect()
}

pub fn alice_identity(backend: &FakeBackend) -> Option<Identity> {
    backend.current_session().map(|s| s.identity())
}
