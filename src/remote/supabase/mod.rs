//! Hosted Backend Client
//!
//! Implements [`AuthApi`](super::AuthApi), [`DataApi`](super::DataApi) and
//! [`RealtimeApi`](super::RealtimeApi) against a Supabase project:
//!
//! - **`auth`** - GoTrue endpoints under `/auth/v1`
//! - **`rest`** - PostgREST endpoints under `/rest/v1`
//! - **`realtime`** - Phoenix websocket under `/realtime/v1/websocket`
//! - **`session_file`** - JSON file keeping the session across restarts
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use talk::remote::supabase::SupabaseClient;
//! use talk::shared::AppConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let client = Arc::new(SupabaseClient::new(config));
//! # Ok(())
//! # }
//! ```

mod auth;
mod realtime;
mod rest;
mod session_file;

pub use session_file::SessionFile;

use std::sync::atomic::AtomicBool;

use reqwest::{Client, RequestBuilder, Response};
use tokio::sync::{broadcast, RwLock};

use crate::shared::error::remote_error_message;
use crate::shared::{AppConfig, AuthChangeEvent, AuthStateChange, Result, Session, TalkError};

/// Capacity of the auth-state broadcast channel
const AUTH_EVENT_CAPACITY: usize = 32;

/// Client for one Supabase project
#[derive(Debug)]
pub struct SupabaseClient {
    config: AppConfig,
    client: Client,
    session: RwLock<Option<Session>>,
    auth_events: broadcast::Sender<AuthStateChange>,
    session_file: Option<SessionFile>,
    initial_session_sent: AtomicBool,
}

/// Which error variant a failed response maps to
#[derive(Debug, Clone, Copy)]
enum Service {
    Auth,
    Data,
}

impl SupabaseClient {
    /// Create a client, restoring a persisted session when one exists
    pub fn new(config: AppConfig) -> Self {
        let session_file = config.session_path().map(SessionFile::new);
        let restored = session_file.as_ref().and_then(SessionFile::load);
        if let Some(ref session) = restored {
            tracing::info!("Restored session for user {}", session.user.id);
        }

        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            config,
            client: Client::new(),
            session: RwLock::new(restored),
            auth_events,
            session_file,
            initial_session_sent: AtomicBool::new(false),
        }
    }

    /// Configuration this client was built with
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token for the `Authorization` header: the user's access token when signed
    /// in, the anonymous key otherwise
    async fn bearer_token(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    /// Add the `apikey` and `Authorization` headers
    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.bearer_token().await;
        request
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", token))
    }

    /// Replace the current session, persist it and notify subscribers
    async fn store_session(&self, session: Option<Session>, event: AuthChangeEvent) {
        *self.session.write().await = session.clone();

        if let Some(ref file) = self.session_file {
            let persisted = match session {
                Some(ref session) => file.save(session),
                None => file.clear(),
            };
            if let Err(e) = persisted {
                tracing::warn!("Failed to persist session: {}", e);
            }
        }

        tracing::info!("Auth state changed: {:?}", event);
        // No subscribers is fine
        let _ = self.auth_events.send(AuthStateChange::new(event, session));
    }
}

/// Turn a non-success response into the matching error, keeping the backend's
/// message verbatim
async fn check(response: Response, service: Service) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_else(|_| status.to_string());
    let message = remote_error_message(&error_text, status);
    Err(match service {
        Service::Auth => TalkError::auth(message),
        Service::Data => TalkError::remote(status.as_u16(), message),
    })
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
