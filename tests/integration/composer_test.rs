//! Message Composer integration tests

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use talk::client::{SendOutcome, SkipReason, SyncState};
use talk::shared::{Identity, Room, TalkError, ToastLevel, UiEvent};

use crate::common::*;

fn alice() -> Identity {
    Identity {
        id: "user-1".to_string(),
        email: ALICE_EMAIL.to_string(),
    }
}

#[tokio::test]
async fn test_send_inserts_trimmed_draft() {
    let (backend, context) = context();
    let room = backend.seed_room("General");
    context.session().set_identity(Some(alice()));
    context.session().set_current_room(Some(room.clone()));

    let mut composer = context.composer();
    composer.set_draft("  Bonjour à tous  ");
    let outcome = assert_ok!(composer.send().await);

    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(composer.draft(), "");
    let stored = backend.stored_messages(room.id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "Bonjour à tous");
    assert_eq!(stored[0].user_id, "user-1");
    assert_eq!(stored[0].email, ALICE_EMAIL);
}

#[tokio::test]
async fn test_preconditions_skip_without_calling_service() {
    let (backend, context) = context();
    let mut composer = context.composer();
    composer.set_draft("salut");

    // Signed out, welcome room selected
    assert_eq!(
        assert_ok!(composer.send().await),
        SendOutcome::Skipped(SkipReason::NotAuthenticated)
    );

    context.session().set_identity(Some(alice()));
    context.session().set_current_room(None);
    assert_eq!(
        assert_ok!(composer.send().await),
        SendOutcome::Skipped(SkipReason::NoRoom)
    );

    context.session().set_current_room(Some(Room::welcome()));
    composer.set_draft(" \n\t ");
    assert_eq!(
        assert_ok!(composer.send().await),
        SendOutcome::Skipped(SkipReason::EmptyDraft)
    );

    assert_eq!(backend.message_inserts(), 0);
    assert_eq!(composer.draft(), " \n\t ");
}

#[tokio::test]
async fn test_failed_send_keeps_draft() {
    let (backend, context) = context();
    backend.fail_insert_message.store(true, Ordering::SeqCst);
    context.session().set_identity(Some(alice()));
    let mut events = context.notifications();

    let mut composer = context.composer();
    composer.set_draft("perdu ?");
    assert_err!(composer.send().await, TalkError::Network { .. });

    assert_eq!(composer.draft(), "perdu ?");
    assert_eq!(backend.message_inserts(), 1);
    let events = drain_events(&mut events);
    assert!(matches!(
        events.as_slice(),
        [UiEvent::Toast { level: ToastLevel::Error, .. }]
    ));
}

#[tokio::test]
async fn test_sent_message_reaches_live_room() {
    let (backend, context) = context();
    let room = backend.seed_room("General");
    context.session().set_identity(Some(alice()));

    let sync = context.spawn_synchronizer();
    let mut view = sync.view();
    wait_for_view(&mut view, |v| v.state == SyncState::Live { room_id: room.id }).await;

    let mut composer = context.composer();
    composer.set_draft("Premier message");
    assert_eq!(assert_ok!(composer.send().await), SendOutcome::Sent);

    let live = wait_for_view(&mut view, |v| v.messages.len() == 1).await;
    assert_eq!(live.messages[0].content, "Premier message");
    assert_eq!(live.messages[0].room_id, room.id);

    sync.shutdown().await;
}
