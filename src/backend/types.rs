//! Backend types — identities, profile rows, auth notifications and errors.
//!
//! These mirror what the hosted auth/database/storage service exposes. The
//! `Backend` trait is the only seam the rest of the crate talks through, so
//! tests can swap in an in-memory implementation.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend rejected an email/password pair.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// The backend answered with a non-success status.
    #[error("backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("backend request failed: {0}")]
    Request(String),

    /// A response body did not have the expected shape.
    #[error("backend response parse failed: {0}")]
    Parse(String),

    /// A row or object that had to exist was missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A configuration value was missing or malformed.
    #[error("backend config: {0}")]
    Config(String),
}

// =============================================================================
// IDENTITY + AUTH NOTIFICATIONS
// =============================================================================

/// The signed-in backend user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
}

/// Session-change notification pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub user: Option<Identity>,
}

// =============================================================================
// PROFILE ROW
// =============================================================================

/// One row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    /// Empty until signup records the chosen name (the column may be null).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Partial profile row. Absent fields are left untouched by the backend;
/// `Some(None)` on a nullable column writes `null`.
///
/// There is no `id` field: the primary key never changes after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl ProfileUpdate {
    /// Every user-editable column of `profile`, as currently held locally.
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            // An empty username stays null rather than claiming "".
            username: Some(profile.username.clone()).filter(|u| !u.is_empty()),
            display_name: Some(profile.display_name.clone()),
            full_name: Some(profile.full_name.clone()),
            avatar_url: Some(profile.avatar_url.clone()),
            address: Some(profile.address.clone()),
            phone: Some(profile.phone.clone()),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn touched(mut self, at: OffsetDateTime) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Apply the present fields onto a local copy of the row.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(username) = &self.username {
            profile.username.clone_from(username);
        }
        if let Some(display_name) = &self.display_name {
            profile.display_name.clone_from(display_name);
        }
        if let Some(full_name) = &self.full_name {
            profile.full_name.clone_from(full_name);
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url.clone_from(avatar_url);
        }
        if let Some(address) = &self.address {
            profile.address.clone_from(address);
        }
        if let Some(phone) = &self.phone {
            profile.phone.clone_from(phone);
        }
        if let Some(updated_at) = self.updated_at {
            profile.updated_at = updated_at;
        }
    }
}

/// Row filter for profile reads and updates. Username and email are unique
/// on the backend side; `Id` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileFilter {
    Id(Uuid),
    Email(String),
    Username(String),
}

impl ProfileFilter {
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::Email(_) => "email",
            Self::Username(_) => "username",
        }
    }

    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Email(v) | Self::Username(v) => v.clone(),
        }
    }

    #[must_use]
    pub fn matches(&self, profile: &Profile) -> bool {
        match self {
            Self::Id(id) => profile.id == *id,
            Self::Email(email) => profile.email == *email,
            Self::Username(username) => profile.username == *username,
        }
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// Async surface of the hosted auth/database/storage service.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// The identity of the locally held session, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the session cannot be read.
    async fn current_session(&self) -> Result<Option<Identity>, BackendError>;

    /// Subscribe to session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;

    /// Create a session from an email/password pair.
    ///
    /// # Errors
    ///
    /// [`BackendError::InvalidCredentials`] on a rejected password, other
    /// variants on transport or service failures.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, BackendError>;

    /// Register an account. The backend owns the verification email flow.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if registration is refused or the call fails.
    async fn sign_up(&self, email: &str, password: &str, redirect_to: Option<&str>)
    -> Result<Identity, BackendError>;

    /// Tear down the current session.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the backend refuses the logout.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Ask the backend to send a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the request fails.
    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError>;

    /// Read every profile row matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the query fails.
    async fn select_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, BackendError>;

    /// Update every profile row matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the update fails.
    async fn update_profiles(&self, filter: &ProfileFilter, update: &ProfileUpdate) -> Result<(), BackendError>;

    /// Store `bytes` under `path` in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the upload fails.
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError>;

    /// Publicly fetchable URL of an object.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
