//! Auth Types
//!
//! Identity and session values produced by the remote auth service, and the
//! auth-state change notifications it pushes.

use serde::{Deserialize, Serialize};

/// The authenticated user as seen by the rest of the application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

/// User record returned by the auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token pair issued by the auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: i64,
    /// Unix time at which the access token expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Identity carried by this session
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.user.id.clone(),
            email: self.user.email.clone().unwrap_or_default(),
        }
    }

    /// Fill `expires_at` from `expires_in` when the service left it out
    pub fn with_expiry_from(mut self, now_unix: i64) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now_unix + self.expires_in);
        }
        self
    }

    /// Whether the access token expires within `margin_secs` of `now_unix`
    pub fn expires_within(&self, now_unix: i64, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - margin_secs <= now_unix,
            None => false,
        }
    }
}

/// Kind of auth-state change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// One notification from the auth-state feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

impl AuthStateChange {
    pub fn new(event: AuthChangeEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }

    /// Identity this change leaves the application with
    pub fn identity(&self) -> Option<Identity> {
        self.session.as_ref().map(Session::identity)
    }
}
