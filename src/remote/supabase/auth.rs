//! GoTrue client
//!
//! Sign-up, sign-in, password recovery, sign-out and token refresh against
//! `/auth/v1`. Every session change goes through [`SupabaseClient::store_session`],
//! which also feeds the auth-state broadcast.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::{check, now_unix, Service, SupabaseClient};
use crate::remote::AuthApi;
use crate::shared::{AuthChangeEvent, AuthStateChange, AuthUser, Result, Session, TalkError};

/// Refresh this long before the access token expires
const REFRESH_MARGIN_SECS: i64 = 60;

/// Wait before retrying a refresh that failed on the network
const REFRESH_RETRY: Duration = Duration::from_secs(10);

/// Sign-up answers with a session when confirmation is off, with the bare user
/// otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Session),
    User(AuthUser),
}

/// Tokens carried in the fragment of a recovery or magic link
#[derive(Debug, Default, PartialEq, Eq)]
struct LinkTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    link_type: Option<String>,
    error_description: Option<String>,
}

impl LinkTokens {
    /// Parse `access_token=..&refresh_token=..&type=recovery` from the link's
    /// fragment, or its query when it has no fragment
    fn parse(link: &str) -> Result<Self> {
        let url = Url::parse(link).map_err(|e| TalkError::auth(format!("Invalid link: {}", e)))?;
        let params = url.fragment().or_else(|| url.query()).unwrap_or_default();
        // Reuse the query parser for the fragment
        let carrier = Url::parse(&format!("http://link/?{}", params))
            .map_err(|e| TalkError::auth(format!("Invalid link: {}", e)))?;

        let mut tokens = LinkTokens::default();
        for (key, value) in carrier.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "access_token" => tokens.access_token = Some(value),
                "refresh_token" => tokens.refresh_token = Some(value),
                "expires_in" => tokens.expires_in = value.parse().ok(),
                "expires_at" => tokens.expires_at = value.parse().ok(),
                "type" => tokens.link_type = Some(value),
                "error_description" => tokens.error_description = Some(value),
                _ => {}
            }
        }
        Ok(tokens)
    }
}

impl SupabaseClient {
    /// Exchange the refresh token for a new session.
    ///
    /// A rejected refresh token ends the session locally.
    pub async fn refresh_session(&self) -> Result<Session> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(TalkError::NotAuthenticated)?;

        let response = self
            .client
            .post(self.config.auth_url("/token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let response = match check(response, Service::Auth).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Token refresh rejected: {}", e);
                self.store_session(None, AuthChangeEvent::SignedOut).await;
                return Err(e);
            }
        };

        let session = response.json::<Session>().await?.with_expiry_from(now_unix());
        self.store_session(Some(session.clone()), AuthChangeEvent::TokenRefreshed)
            .await;
        Ok(session)
    }

    /// Keep the session fresh in the background.
    ///
    /// The task sleeps until shortly before the access token expires, refreshes
    /// it, and starts over whenever the auth state changes. Abort the returned
    /// handle to stop it.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let mut changes = client.auth_events.subscribe();

        tokio::spawn(async move {
            loop {
                let delay = client.refresh_delay().await;
                let due = match delay {
                    Some(delay) => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => true,
                            change = changes.recv() => {
                                if matches!(change, Err(RecvError::Closed)) {
                                    break;
                                }
                                false
                            }
                        }
                    }
                    None => match changes.recv().await {
                        Err(RecvError::Closed) => break,
                        _ => false,
                    },
                };
                if !due {
                    continue;
                }

                match client.refresh_session().await {
                    Ok(_) => tracing::debug!("Access token refreshed"),
                    Err(TalkError::Auth { .. }) | Err(TalkError::NotAuthenticated) => {}
                    Err(e) => {
                        tracing::warn!("Token refresh failed, retrying: {}", e);
                        tokio::time::sleep(REFRESH_RETRY).await;
                    }
                }
            }
            tracing::debug!("Auto-refresh stopped");
        })
    }

    /// Time until the current session needs a refresh, `None` without a session
    /// or expiry
    async fn refresh_delay(&self) -> Option<Duration> {
        let expires_at = self.session.read().await.as_ref()?.expires_at?;
        let secs = (expires_at - REFRESH_MARGIN_SECS - now_unix()).max(0);
        Some(Duration::from_secs(secs as u64))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser> {
        let response = self
            .client
            .get(self.config.auth_url("/user"))
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let response = check(response, Service::Auth).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuthApi for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        tracing::debug!("Signing up {}", email);
        let response = self
            .client
            .post(self.config.auth_url("/signup"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = check(response, Service::Auth).await?;

        match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(session) => {
                let session = session.with_expiry_from(now_unix());
                self.store_session(Some(session.clone()), AuthChangeEvent::SignedIn)
                    .await;
                Ok(Some(session))
            }
            SignUpResponse::User(user) => {
                tracing::info!("Sign-up pending confirmation for user {}", user.id);
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        tracing::debug!("Signing in {}", email);
        let response = self
            .client
            .post(self.config.auth_url("/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = check(response, Service::Auth).await?;

        let session = response.json::<Session>().await?.with_expiry_from(now_unix());
        self.store_session(Some(session.clone()), AuthChangeEvent::SignedIn)
            .await;
        Ok(session)
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()> {
        let response = self
            .client
            .post(self.config.auth_url("/recover"))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(response, Service::Auth).await?;
        Ok(())
    }

    async fn update_user_password(&self, password: &str) -> Result<()> {
        let current = self
            .session
            .read()
            .await
            .clone()
            .ok_or(TalkError::NotAuthenticated)?;

        let response = self
            .client
            .put(self.config.auth_url("/user"))
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", current.access_token))
            .json(&json!({ "password": password }))
            .send()
            .await?;
        let response = check(response, Service::Auth).await?;

        let user = response.json::<AuthUser>().await?;
        let updated = Session { user, ..current };
        self.store_session(Some(updated), AuthChangeEvent::UserUpdated)
            .await;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let current = self.session.read().await.clone();
        let Some(current) = current else {
            self.store_session(None, AuthChangeEvent::SignedOut).await;
            return Ok(());
        };

        let outcome = self
            .client
            .post(self.config.auth_url("/logout"))
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", current.access_token))
            .send()
            .await;

        // The local session ends whatever the service says
        self.store_session(None, AuthChangeEvent::SignedOut).await;

        let response = outcome?;
        let status = response.status();
        // Already revoked or expired upstream
        if matches!(status.as_u16(), 401 | 403 | 404) {
            tracing::debug!("Logout answered {}, session was already gone", status);
            return Ok(());
        }
        check(response, Service::Auth).await?;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        let current = self.session.read().await.clone();

        let session = match current {
            Some(session) if session.expires_within(now_unix(), REFRESH_MARGIN_SECS) => {
                match self.refresh_session().await {
                    Ok(session) => Some(session),
                    Err(TalkError::Auth { .. }) => None,
                    Err(e) => return Err(e),
                }
            }
            other => other,
        };

        if !self.initial_session_sent.swap(true, Ordering::SeqCst) {
            let _ = self.auth_events.send(AuthStateChange::new(
                AuthChangeEvent::InitialSession,
                session.clone(),
            ));
        }
        Ok(session)
    }

    async fn set_session_from_url(&self, link: &str) -> Result<Session> {
        let tokens = LinkTokens::parse(link)?;
        if let Some(description) = tokens.error_description {
            return Err(TalkError::auth(description));
        }
        let (Some(access_token), Some(refresh_token)) = (tokens.access_token, tokens.refresh_token)
        else {
            return Err(TalkError::auth("Link does not contain a session"));
        };

        let user = self.fetch_user(&access_token).await?;
        let session = Session {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: tokens.expires_in.unwrap_or_default(),
            expires_at: tokens.expires_at,
            user,
        }
        .with_expiry_from(now_unix());

        let event = if tokens.link_type.as_deref() == Some("recovery") {
            AuthChangeEvent::PasswordRecovery
        } else {
            AuthChangeEvent::SignedIn
        };
        self.store_session(Some(session.clone()), event).await;
        Ok(session)
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.auth_events.subscribe()
    }
}
