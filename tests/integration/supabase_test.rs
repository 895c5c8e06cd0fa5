//! Supabase client integration tests
//!
//! Runs the HTTP side of the client against a wiremock stand-in for the auth
//! service and the data API.

use std::path::Path;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use talk::remote::supabase::SupabaseClient;
use talk::remote::{AuthApi, DataApi};
use talk::shared::{AppConfig, AuthChangeEvent, NewMessage, TalkError};

const ANON_KEY: &str = "anon-key";

fn config(server: &MockServer) -> AppConfig {
    AppConfig::builder()
        .backend_url(server.uri())
        .anon_key(ANON_KEY)
        .site_url("https://talk.example")
        .persist_session(false)
        .build()
        .expect("valid config")
}

fn persisted_config(server: &MockServer, file: &Path) -> AppConfig {
    AppConfig::builder()
        .backend_url(server.uri())
        .anon_key(ANON_KEY)
        .persist_session(true)
        .session_file(file)
        .build()
        .expect("valid config")
}

fn session_body(access_token: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": format!("refresh-{}", access_token),
        "token_type": "bearer",
        "expires_in": expires_in,
        "user": { "id": "u-1", "email": "alice@talk.fr", "role": "authenticated" }
    })
}

async fn mount_sign_in(server: &MockServer, access_token: &str, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_json(json!({ "email": "alice@talk.fr", "password": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(access_token, expires_in)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sign_in_stores_and_broadcasts_session() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "access-1", 3600).await;
    let client = SupabaseClient::new(config(&server));
    let mut changes = client.on_auth_state_change();

    let session = assert_ok!(client.sign_in_with_password("alice@talk.fr", "secret").await);

    assert_eq!(session.access_token, "access-1");
    assert!(session.expires_at.is_some());
    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.event, AuthChangeEvent::SignedIn);
    assert_eq!(change.identity().map(|i| i.id), Some("u-1".to_string()));

    let current = assert_ok!(client.get_session().await);
    assert_eq!(current.map(|s| s.access_token), Some("access-1".to_string()));
    // The first read also announces the initial session
    let initial = assert_ok!(changes.recv().await);
    assert_eq!(initial.event, AuthChangeEvent::InitialSession);
}

#[tokio::test]
async fn test_rejected_credentials_keep_service_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));

    let result = client.sign_in_with_password("alice@talk.fr", "nope").await;

    match result {
        Err(TalkError::Auth { message }) => assert_eq!(message, "Invalid login credentials"),
        other => panic!("Expected auth error, got {:?}", other),
    }
    assert!(assert_ok!(client.get_session().await).is_none());
}

#[tokio::test]
async fn test_sign_up_pending_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_json(json!({ "email": "bob@talk.fr", "password": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-2",
            "email": "bob@talk.fr",
            "confirmation_sent_at": "2025-03-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));

    let session = assert_ok!(client.sign_up("bob@talk.fr", "secret").await);

    assert!(session.is_none());
}

#[tokio::test]
async fn test_reset_request_carries_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/recover"))
        .and(query_param("redirect_to", "https://talk.example/reset-password"))
        .and(body_json(json!({ "email": "alice@talk.fr" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let config = config(&server);
    let redirect = config.reset_redirect_url();
    let client = SupabaseClient::new(config);

    assert_ok!(client.reset_password_for_email("alice@talk.fr", &redirect).await);
}

#[tokio::test]
async fn test_data_requests_use_access_token() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "access-1", 3600).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/rooms"))
        .and(query_param("order", "created_at.asc"))
        .and(header("apikey", ANON_KEY))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Bienvenue sur Talk", "created_at": "2025-03-01T10:00:00+00:00" },
            { "id": 2, "name": "Rust", "created_at": "2025-03-01T11:00:00+00:00" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));
    assert_ok!(client.sign_in_with_password("alice@talk.fr", "secret").await);

    let rooms = assert_ok!(client.list_rooms().await);

    let names: Vec<_> = rooms.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Bienvenue sur Talk", "Rust"]);
}

#[tokio::test]
async fn test_signed_out_requests_use_anon_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("room_id", "eq.7"))
        // Same-instant inserts keep the order the backend assigned ids in
        .and(query_param("order", "created_at.asc,id.asc"))
        .and(header("Authorization", format!("Bearer {}", ANON_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 10, "content": "bonjour", "user_id": "u-1", "email": "alice@talk.fr",
                "created_at": "2025-03-01T10:00:00.123456+00:00", "room_id": 7
            },
            {
                "id": 11, "content": "salut", "user_id": "u-2", "email": "bob@talk.fr",
                "created_at": "2025-03-01T10:00:05.5", "room_id": 7
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));

    let messages = assert_ok!(client.list_messages(7).await);

    assert_eq!(messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![10, 11]);
    assert!(messages[0].created_at < messages[1].created_at);
}

#[tokio::test]
async fn test_insert_room_returns_stored_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rooms"))
        .and(header("Prefer", "return=representation"))
        .and(body_json(json!([{ "name": "Rust" }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": 3, "name": "Rust" }])))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));

    let room = assert_ok!(client.insert_room("Rust").await);

    assert_eq!(room.id, 3);
    assert_eq!(room.name, "Rust");
}

#[tokio::test]
async fn test_insert_message_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .and(header("Prefer", "return=minimal"))
        .and(body_json(json!([{
            "content": "Bonjour",
            "user_id": "u-1",
            "email": "alice@talk.fr",
            "room_id": 7
        }])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));

    let message = NewMessage {
        content: "Bonjour".to_string(),
        user_id: "u-1".to_string(),
        email: "alice@talk.fr".to_string(),
        room_id: 7,
    };
    assert_ok!(client.insert_message(&message).await);
}

#[tokio::test]
async fn test_data_errors_keep_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rooms"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy for table \"rooms\""
        })))
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));

    match client.insert_room("Privé").await {
        Err(TalkError::Remote { status, message }) => {
            assert_eq!(status, 403);
            assert_contains!(message, "row-level security");
        }
        other => panic!("Expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expiring_session_is_refreshed_on_read() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "access-1", 30).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "refresh-access-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-2", 3600)))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));
    assert_ok!(client.sign_in_with_password("alice@talk.fr", "secret").await);
    let mut changes = client.on_auth_state_change();

    let session = assert_ok!(client.get_session().await);

    assert_eq!(session.map(|s| s.access_token), Some("access-2".to_string()));
    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.event, AuthChangeEvent::TokenRefreshed);
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "access-1", 30).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid Refresh Token: Already Used"
        })))
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));
    assert_ok!(client.sign_in_with_password("alice@talk.fr", "secret").await);
    let mut changes = client.on_auth_state_change();

    let session = assert_ok!(client.get_session().await);

    assert!(session.is_none());
    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.event, AuthChangeEvent::SignedOut);
    assert!(change.session.is_none());
}

#[tokio::test]
async fn test_recovery_link_opens_recovery_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("Authorization", "Bearer rec-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "u-1", "email": "alice@talk.fr" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .and(header("Authorization", "Bearer rec-token"))
        .and(body_json(json!({ "password": "nouveau" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "u-1", "email": "alice@talk.fr" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));
    let mut changes = client.on_auth_state_change();

    let link = "https://talk.example/reset-password#access_token=rec-token&expires_in=3600&refresh_token=rec-refresh&token_type=bearer&type=recovery";
    let session = assert_ok!(client.set_session_from_url(link).await);

    assert_eq!(session.access_token, "rec-token");
    assert_eq!(session.refresh_token, "rec-refresh");
    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.event, AuthChangeEvent::PasswordRecovery);

    assert_ok!(client.update_user_password("nouveau").await);
    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.event, AuthChangeEvent::UserUpdated);
}

#[tokio::test]
async fn test_expired_recovery_link_is_rejected() {
    let server = MockServer::start().await;
    let client = SupabaseClient::new(config(&server));

    let link = "https://talk.example/reset-password#error=access_denied&error_code=otp_expired&error_description=Email+link+is+invalid+or+has+expired";
    match client.set_session_from_url(link).await {
        Err(TalkError::Auth { message }) => {
            assert_eq!(message, "Email link is invalid or has expired")
        }
        other => panic!("Expected auth error, got {:?}", other),
    }
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_password_update_needs_session() {
    let server = MockServer::start().await;
    let client = SupabaseClient::new(config(&server));

    assert_err!(
        client.update_user_password("nouveau").await,
        TalkError::NotAuthenticated
    );
}

#[tokio::test]
async fn test_sign_out_tolerates_revoked_token() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "access-1", 3600).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
        .expect(1)
        .mount(&server)
        .await;
    let client = SupabaseClient::new(config(&server));
    assert_ok!(client.sign_in_with_password("alice@talk.fr", "secret").await);
    let mut changes = client.on_auth_state_change();

    assert_ok!(client.sign_out().await);

    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.event, AuthChangeEvent::SignedOut);
    assert!(assert_ok!(client.get_session().await).is_none());
}

#[tokio::test]
async fn test_session_survives_restart() {
    let server = MockServer::start().await;
    mount_sign_in(&server, "access-1", 3600).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().expect("temp dir");
    let file = dir.path().join("session.json");

    let first = SupabaseClient::new(persisted_config(&server, &file));
    assert_ok!(first.sign_in_with_password("alice@talk.fr", "secret").await);
    assert!(file.exists());

    let second = SupabaseClient::new(persisted_config(&server, &file));
    let restored = assert_ok!(second.get_session().await);
    assert_eq!(restored.map(|s| s.access_token), Some("access-1".to_string()));

    assert_ok!(second.sign_out().await);
    assert!(!file.exists());

    let third = SupabaseClient::new(persisted_config(&server, &file));
    assert!(assert_ok!(third.get_session().await).is_none());
}
