//! Signup form — local validation, live username check, account creation.
//!
//! DESIGN
//! ======
//! `SignupForm` is a headless view-model. Field setters keep derived state
//! (password strength, username availability) current; `submit()` runs the
//! local checks in a fixed order and only then touches the network.
//!
//! Username availability is published on a `watch` channel so a live client
//! (the signup websocket) can forward each debounced result as it lands.
//!
//! ERROR HANDLING
//! ==============
//! Validation failures carry their own message. Every failure after the
//! checks pass (registration, profile update) collapses into the generic
//! `Failed` message and is logged. Registration followed by a failed profile
//! update leaves the account without its chosen username; nothing undoes it.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::backend::{Backend, Identity, ProfileFilter, ProfileUpdate};
use crate::services::auth::{AuthError, AuthStore};
use crate::services::debounce::{Debouncer, USERNAME_CHECK_DELAY};
use crate::services::password::{PasswordStrength, STRENGTH_REQUIREMENT, classify};

/// Shorter usernames are never looked up.
pub const MIN_USERNAME_CHECK_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignupError {
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("{}", STRENGTH_REQUIREMENT)]
    WeakPassword,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Failed to create an account")]
    Failed,
}

impl SignupError {
    /// True for failures caught before any network call.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Latest username availability result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

/// Serializable snapshot of the form's derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignupView {
    pub username: String,
    pub password_strength: PasswordStrength,
    pub username_available: bool,
    /// A debounced lookup is still waiting or in flight.
    pub checking_username: bool,
    pub error: Option<String>,
    pub loading: bool,
}

/// Look up whether `username` is free. A failed lookup counts as free.
pub async fn username_available(backend: &dyn Backend, username: &str) -> bool {
    match backend
        .select_profiles(&ProfileFilter::Username(username.to_owned()))
        .await
    {
        Ok(rows) => rows.is_empty(),
        Err(e) => {
            warn!(error = %e, %username, "username availability lookup failed");
            true
        }
    }
}

pub struct SignupForm {
    backend: Arc<dyn Backend>,
    auth: AuthStore,
    email: String,
    username: String,
    display_name: String,
    password: String,
    confirm_password: String,
    strength: PasswordStrength,
    availability: Arc<watch::Sender<UsernameAvailability>>,
    debouncer: Debouncer,
    error: Option<String>,
    loading: bool,
}

impl SignupForm {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, auth: AuthStore) -> Self {
        let (availability, _) = watch::channel(UsernameAvailability { username: String::new(), available: true });
        Self {
            backend,
            auth,
            email: String::new(),
            username: String::new(),
            display_name: String::new(),
            password: String::new(),
            confirm_password: String::new(),
            strength: PasswordStrength::Unclassified,
            availability: Arc::new(availability),
            debouncer: Debouncer::new(USERNAME_CHECK_DELAY),
            error: None,
            loading: false,
        }
    }

    // =========================================================================
    // FIELDS
    // =========================================================================

    pub fn set_email(&mut self, email: &str) {
        email.clone_into(&mut self.email);
    }

    pub fn set_display_name(&mut self, display_name: &str) {
        display_name.clone_into(&mut self.display_name);
    }

    pub fn set_password(&mut self, password: &str) {
        password.clone_into(&mut self.password);
        self.strength = classify(&self.password);
    }

    pub fn set_confirm_password(&mut self, confirm_password: &str) {
        confirm_password.clone_into(&mut self.confirm_password);
    }

    /// Store the lower-cased username and schedule a debounced lookup.
    pub fn set_username(&mut self, username: &str) {
        self.username = username.to_lowercase();
        if self.username.chars().count() < MIN_USERNAME_CHECK_LEN {
            self.debouncer.cancel();
            return;
        }

        let backend = Arc::clone(&self.backend);
        let availability = Arc::clone(&self.availability);
        let username = self.username.clone();
        self.debouncer.schedule(async move {
            let available = username_available(backend.as_ref(), &username).await;
            availability.send_replace(UsernameAvailability { username, available });
        });
    }

    /// Run the availability lookup for the current username right away.
    pub async fn check_username_now(&mut self) -> bool {
        self.debouncer.cancel();
        if self.username.chars().count() < MIN_USERNAME_CHECK_LEN {
            return self.username_available();
        }
        let available = username_available(self.backend.as_ref(), &self.username).await;
        self.availability
            .send_replace(UsernameAvailability { username: self.username.clone(), available });
        available
    }

    // =========================================================================
    // DERIVED STATE
    // =========================================================================

    #[must_use]
    pub fn username_available(&self) -> bool {
        self.availability.borrow().available
    }

    #[must_use]
    pub fn subscribe_availability(&self) -> watch::Receiver<UsernameAvailability> {
        self.availability.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> SignupView {
        SignupView {
            username: self.username.clone(),
            password_strength: self.strength,
            username_available: self.username_available(),
            checking_username: self.debouncer.is_pending(),
            error: self.error.clone(),
            loading: self.loading,
        }
    }

    // =========================================================================
    // SUBMIT
    // =========================================================================

    /// Validate locally, then register and record username/display name.
    ///
    /// # Errors
    ///
    /// Returns the first failed validation, or [`SignupError::Failed`] if any
    /// backend step fails.
    pub async fn submit(&mut self) -> Result<Identity, SignupError> {
        if let Err(e) = self.check_passwords() {
            return Err(self.fail(e));
        }
        if !self.username_available() {
            return Err(self.fail(SignupError::UsernameTaken));
        }

        self.error = None;
        self.loading = true;
        let result = self.register().await;
        self.loading = false;

        match result {
            Ok(user) => {
                info!(user_id = %user.id, username = %self.username, "signup complete");
                Ok(user)
            }
            Err(e) => {
                error!(error = %e, email = %self.email, "signup failed");
                Err(self.fail(SignupError::Failed))
            }
        }
    }

    /// Submit for clients without the live username check: the passwords are
    /// validated first, then availability is refreshed, then `submit` runs.
    ///
    /// # Errors
    ///
    /// Same as [`SignupForm::submit`].
    pub async fn submit_fresh(&mut self) -> Result<Identity, SignupError> {
        if let Err(e) = self.check_passwords() {
            return Err(self.fail(e));
        }
        self.check_username_now().await;
        self.submit().await
    }

    fn check_passwords(&self) -> Result<(), SignupError> {
        if self.password != self.confirm_password {
            return Err(SignupError::PasswordMismatch);
        }
        if self.strength != PasswordStrength::Strong {
            return Err(SignupError::WeakPassword);
        }
        Ok(())
    }

    async fn register(&self) -> Result<Identity, AuthError> {
        let user = self.auth.sign_up(&self.email, &self.password).await?;
        let update = ProfileUpdate {
            username: Some(self.username.clone()),
            display_name: Some(self.display_name.clone()),
            ..ProfileUpdate::default()
        };
        self.backend
            .update_profiles(&ProfileFilter::Email(self.email.clone()), &update)
            .await?;
        Ok(user)
    }

    fn fail(&mut self, err: SignupError) -> SignupError {
        self.error = Some(err.to_string());
        err
    }
}

#[cfg(test)]
#[path = "signup_test.rs"]
mod tests;
