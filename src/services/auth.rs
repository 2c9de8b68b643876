//! Auth session holder — the current signed-in identity for the whole app.
//!
//! ARCHITECTURE
//! ============
//! `AuthStore` is an observable store over a `watch` channel. `init()` spawns
//! a listener that resolves the initial session and then follows the
//! backend's session-change notifications; `teardown()` stops it. `main`
//! owns both calls, so the subscription lives exactly as long as the app.
//!
//! ERROR HANDLING
//! ==============
//! Every sign-in failure caused by a bad credential (unknown username, failed
//! lookup, rejected password) surfaces as the same `InvalidCredentials`
//! message so callers cannot tell which part was wrong.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::config::BackendConfig;
use crate::backend::{AuthChange, Backend, BackendError, Identity, ProfileFilter};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Snapshot of the session as seen by views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub user: Option<Identity>,
    /// True until the initial session check resolves.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

/// Email redirect targets handed to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRedirects {
    pub signup: Option<String>,
    pub password_reset: Option<String>,
}

impl AuthRedirects {
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        Self { signup: config.signup_redirect(), password_reset: config.reset_redirect() }
    }
}

#[derive(Clone)]
pub struct AuthStore {
    backend: Arc<dyn Backend>,
    redirects: AuthRedirects,
    state: Arc<watch::Sender<AuthState>>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AuthStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, redirects: AuthRedirects) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self { backend, redirects, state: Arc::new(state), listener: Arc::new(Mutex::new(None)) }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Subscribe to backend session changes and resolve the initial session.
    /// Calling `init` again replaces the previous listener.
    pub fn init(&self) {
        // Subscribe before the session check so no change can slip between.
        let changes = self.backend.subscribe();
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(run_listener(backend, state, changes));

        let mut slot = self.listener.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stop following backend session changes.
    pub fn teardown(&self) {
        let mut slot = self.listener.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Resolve once the initial session check has completed.
    pub async fn wait_until_loaded(&self) -> AuthState {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.loading).await {
            Ok(state) => state.clone(),
            // Sender lives in `self`, so this only happens during shutdown.
            Err(_) => self.state(),
        }
    }

    fn set_user(&self, user: Option<Identity>) {
        self.state.send_modify(|s| s.user = user);
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Sign in with an email or a username plus password.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] for an unknown username or a rejected
    /// password; [`AuthError::Backend`] for any other backend failure.
    pub async fn sign_in(&self, credential: &str, password: &str) -> Result<Identity, AuthError> {
        let email = if credential.contains('@') {
            credential.to_owned()
        } else {
            self.resolve_username(credential).await?
        };

        let user = self
            .backend
            .sign_in_with_password(&email, password)
            .await
            .map_err(|e| match e {
                BackendError::InvalidCredentials => AuthError::InvalidCredentials,
                other => AuthError::Backend(other),
            })?;
        info!(user_id = %user.id, "signed in");
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    async fn resolve_username(&self, username: &str) -> Result<String, AuthError> {
        match self
            .backend
            .select_profiles(&ProfileFilter::Username(username.to_owned()))
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .next()
                .map(|p| p.email)
                .ok_or(AuthError::InvalidCredentials),
            Err(e) => {
                warn!(error = %e, "username lookup failed during sign-in");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Register an account. The backend sends the verification email.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Backend`] if registration fails.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let user = self
            .backend
            .sign_up(email, password, self.redirects.signup.as_deref())
            .await?;
        info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Backend`] if the backend refuses the sign-out.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.backend.sign_out().await?;
        self.set_user(None);
        Ok(())
    }

    /// Send a password-reset email to `email`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Backend`] if the request fails.
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        self.backend
            .reset_password_for_email(email, self.redirects.password_reset.as_deref())
            .await?;
        Ok(())
    }
}

async fn run_listener(
    backend: Arc<dyn Backend>,
    state: Arc<watch::Sender<AuthState>>,
    mut changes: broadcast::Receiver<AuthChange>,
) {
    let initial = match backend.current_session().await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "initial session check failed");
            None
        }
    };
    state.send_modify(|s| {
        s.user = initial;
        s.loading = false;
    });

    loop {
        match changes.recv().await {
            Ok(change) => {
                info!(event = ?change.event, "session changed");
                state.send_modify(|s| s.user = change.user);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session listener lagged; re-reading session");
                let user = backend.current_session().await.ok().flatten();
                state.send_modify(|s| s.user = user);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
