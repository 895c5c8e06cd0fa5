//! Auth Gateway
//!
//! Turns sign-up / sign-in / reset / sign-out intents into calls on the remote auth
//! service and reports the outcome through toasts and navigation requests.
//!
//! The gateway never writes the identity itself. [`AuthListener`] follows the
//! service's auth-state feed and is the only writer of `SessionStore::identity`,
//! so a pushed change always wins over whatever a call appeared to do locally.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::notify::Notifier;
use super::session::SessionStore;
use crate::remote::Backend;
use crate::shared::{AppView, Result, TalkError};

const SIGN_UP_SUCCESS: &str =
    "Inscription réussie ! Un mail de confirmation a été envoyé à votre email";
const RESET_REQUESTED: &str = "Un email de réinitialisation a été envoyé à votre adresse email";
const PASSWORD_CHANGED: &str = "Votre mot de passe a été modifié avec succès !";
const SIGNED_OUT: &str = "Vous avez été déconnecté";
const INVALID_RECOVERY_LINK: &str = "Lien de réinitialisation invalide ou expiré";

/// Front door to the remote auth service
#[derive(Clone)]
pub struct AuthGateway {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    notifier: Notifier,
    reset_redirect: String,
}

impl AuthGateway {
    /// `reset_redirect` is where password-reset mails send the user back to
    pub fn new(
        backend: Arc<dyn Backend>,
        session: SessionStore,
        notifier: Notifier,
        reset_redirect: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            session,
            notifier,
            reset_redirect: reset_redirect.into(),
        }
    }

    /// Register an account. The service mails a confirmation link.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        required("email", email, "Email est requis")?;
        required("password", password, "mot de passe est requis")?;

        match self.backend.sign_up(email.trim(), password).await {
            Ok(_) => {
                self.notifier.success(SIGN_UP_SUCCESS);
                Ok(())
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Sign in. Failures are returned for inline display only.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        required("email", email, "Email est requis")?;
        required("password", password, "mot de passe est requis")?;

        self.backend
            .sign_in_with_password(email.trim(), password)
            .await
            .map(|session| tracing::info!("Signed in as {}", session.user.id))
            .map_err(|e| {
                tracing::warn!("Sign-in rejected: {}", e);
                e
            })
    }

    /// Mail a password-reset link
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        required("email", email, "Email est requis")?;

        match self
            .backend
            .reset_password_for_email(email.trim(), &self.reset_redirect)
            .await
        {
            Ok(()) => {
                self.notifier.success(RESET_REQUESTED);
                self.notifier.navigate(AppView::Auth);
                Ok(())
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Set the new password from the recovery session, then sign out so the user
    /// logs in again with it
    pub async fn complete_password_reset(&self, new_password: &str) -> Result<()> {
        required("password", new_password, "Le mot de passe est requis")?;

        if let Err(e) = self.backend.update_user_password(new_password).await {
            return Err(self.report(e));
        }
        self.notifier.success(PASSWORD_CHANGED);

        if let Err(e) = self.backend.sign_out().await {
            tracing::warn!("Sign-out after password reset failed: {}", e);
        }
        self.notifier.navigate(AppView::Auth);
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        match self.backend.sign_out().await {
            Ok(()) => {
                self.notifier.success(SIGNED_OUT);
                self.notifier.navigate(AppView::Auth);
                Ok(())
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Open a password-recovery link from the reset mail
    pub async fn open_recovery_link(&self, link: &str) -> Result<()> {
        match self.backend.set_session_from_url(link).await {
            Ok(_) => {
                self.notifier.navigate(AppView::ResetPassword);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Recovery link rejected: {}", e);
                self.notifier.error(INVALID_RECOVERY_LINK);
                self.notifier.navigate(AppView::Auth);
                Err(e)
            }
        }
    }

    /// Start following the auth-state feed
    pub async fn listen(&self) -> AuthListener {
        AuthListener::start(Arc::clone(&self.backend), self.session.clone()).await
    }

    fn report(&self, error: TalkError) -> TalkError {
        tracing::error!("Auth request failed: {}", error);
        self.notifier.error(error.to_string());
        error
    }
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway")
            .field("reset_redirect", &self.reset_redirect)
            .finish_non_exhaustive()
    }
}

fn required(field: &str, value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TalkError::validation(field, message));
    }
    Ok(())
}

/// Long-lived subscription pushing every auth-state change into the Session Store
#[derive(Debug)]
pub struct AuthListener {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AuthListener {
    /// Subscribe to the feed, seed the identity from the current session, then
    /// follow the feed in the background.
    ///
    /// The subscription is taken before the seed read so a change racing with it
    /// is applied afterwards rather than lost.
    pub async fn start(backend: Arc<dyn Backend>, session: SessionStore) -> Self {
        let mut changes = backend.on_auth_state_change();
        seed_identity(backend.as_ref(), &session).await;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    change = changes.recv() => match change {
                        Ok(change) => {
                            tracing::info!("Auth event {:?}", change.event);
                            session.set_identity(change.identity());
                        }
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!("Auth feed lagged by {} events, re-reading session", missed);
                            seed_identity(backend.as_ref(), &session).await;
                        }
                        Err(RecvError::Closed) => {
                            tracing::warn!("Auth feed closed");
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Auth listener stopped");
        });

        Self {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Unsubscribe and wait for the listener task
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Auth listener task failed: {}", e);
        }
    }
}

async fn seed_identity(backend: &dyn Backend, session: &SessionStore) {
    match backend.get_session().await {
        Ok(current) => session.set_identity(current.as_ref().map(|s| s.identity())),
        Err(e) => tracing::warn!("Could not read current session: {}", e),
    }
}
