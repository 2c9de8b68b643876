//! Profile page — display/edit the signed-in user's row, avatar upload,
//! password reset and sign-out.
//!
//! DESIGN
//! ======
//! `ProfilePage` is a headless view-model shared by the profile routes. It
//! remembers which identity it was loaded for; `ensure_loaded()` reloads when
//! the auth store reports a different user and clears everything when nobody
//! is signed in.
//!
//! The avatar flow runs through a `CropSession`: `select_image` opens it,
//! `adjust_crop` moves the selection, `complete_crop` encodes, uploads under
//! `{user_id}/{random}.jpg`, resolves the public URL and writes it to the row.
//!
//! ERROR HANDLING
//! ==============
//! Backend failures during load, save, avatar upload and sign-out are logged
//! and leave the page as it was; callers get a boolean or `None`, not an
//! error. `ProfileError` is reserved for calls made in the wrong state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, Identity, Profile, ProfileFilter, ProfileUpdate};
use crate::components::image_cropper::{
    CROPPED_CONTENT_TYPE, CropError, CropSession, CroppedImage, DisplaySize, Selection,
};
use crate::services::auth::AuthStore;

pub const RESET_SENT_MESSAGE: &str = "Password reset instructions sent to your email";
pub const RESET_FAILED_MESSAGE: &str = "Failed to send reset instructions";
/// How long the reset success message stays before the panel closes.
pub const RESET_MESSAGE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("profile not loaded")]
    NotLoaded,
    #[error("profile is not in edit mode")]
    NotEditing,
    #[error("no crop in progress")]
    NoCropSession,
    #[error(transparent)]
    Crop(#[from] CropError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Display,
    Editing,
}

/// Manual field edits. Email is not editable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileEdits {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

struct ResetPanel {
    email: String,
    message: Option<&'static str>,
    dismiss_at: Option<Instant>,
}

// =============================================================================
// VIEW
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CropView {
    pub natural: DisplaySize,
    pub display: DisplaySize,
    pub selection: Selection,
    pub circular: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetView {
    pub email: String,
    pub message: Option<String>,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub loading: bool,
    pub mode: ProfileMode,
    pub profile: Option<Profile>,
    pub avatar_url: Option<String>,
    pub crop: Option<CropView>,
    pub password_reset: Option<ResetView>,
}

// =============================================================================
// PAGE
// =============================================================================

pub struct ProfilePage {
    backend: Arc<dyn Backend>,
    auth: AuthStore,
    bucket: String,
    user: Option<Identity>,
    loading: bool,
    mode: ProfileMode,
    profile: Option<Profile>,
    avatar_url: Option<String>,
    crop: Option<CropSession>,
    reset: Option<ResetPanel>,
}

impl ProfilePage {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, auth: AuthStore, bucket: impl Into<String>) -> Self {
        Self {
            backend,
            auth,
            bucket: bucket.into(),
            user: None,
            loading: true,
            mode: ProfileMode::Display,
            profile: None,
            avatar_url: None,
            crop: None,
            reset: None,
        }
    }

    fn clear(&mut self) {
        self.user = None;
        self.loading = true;
        self.mode = ProfileMode::Display;
        self.profile = None;
        self.avatar_url = None;
        self.crop = None;
        self.reset = None;
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Load the row for the current identity. A failed read is logged and
    /// leaves the page loaded without a profile.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Unauthenticated`] when nobody is signed in.
    pub async fn load(&mut self) -> Result<(), ProfileError> {
        let Some(user) = self.auth.current_user() else {
            self.clear();
            return Err(ProfileError::Unauthenticated);
        };

        self.clear();
        match self
            .backend
            .select_profiles(&ProfileFilter::Id(user.id))
            .await
        {
            Ok(rows) => match rows.into_iter().next() {
                Some(profile) => {
                    self.avatar_url.clone_from(&profile.avatar_url);
                    self.profile = Some(profile);
                }
                None => error!(user_id = %user.id, "profile row not found"),
            },
            Err(e) => error!(error = %e, user_id = %user.id, "profile load failed"),
        }
        self.user = Some(user);
        self.loading = false;
        Ok(())
    }

    /// Load unless already loaded for the current identity.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Unauthenticated`] when nobody is signed in.
    pub async fn ensure_loaded(&mut self) -> Result<(), ProfileError> {
        let current = self.auth.current_user();
        if current.is_some() && current == self.user && !self.loading {
            return Ok(());
        }
        self.load().await
    }

    // =========================================================================
    // EDIT
    // =========================================================================

    /// Switch between display and edit mode. Leaving edit mode keeps any
    /// unsaved edits in the local copy.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NotLoaded`] if there is no profile to edit.
    pub fn toggle_edit(&mut self) -> Result<ProfileMode, ProfileError> {
        if self.profile.is_none() {
            return Err(ProfileError::NotLoaded);
        }
        self.mode = match self.mode {
            ProfileMode::Display => ProfileMode::Editing,
            ProfileMode::Editing => ProfileMode::Display,
        };
        Ok(self.mode)
    }

    /// Apply field edits to the local copy.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NotEditing`] outside edit mode.
    pub fn apply_edits(&mut self, edits: ProfileEdits) -> Result<(), ProfileError> {
        if self.mode != ProfileMode::Editing {
            return Err(ProfileError::NotEditing);
        }
        let profile = self.profile.as_mut().ok_or(ProfileError::NotLoaded)?;
        if let Some(display_name) = edits.display_name {
            profile.display_name = display_name;
        }
        if let Some(username) = edits.username {
            profile.username = username;
        }
        if let Some(phone) = edits.phone {
            profile.phone = Some(phone);
        }
        if let Some(address) = edits.address {
            profile.address = Some(address);
        }
        Ok(())
    }

    /// Write every editable column plus a fresh `updated_at`. Returns whether
    /// the row was saved; on failure edit mode and the edits are kept.
    ///
    /// # Errors
    ///
    /// Returns a [`ProfileError`] when called outside edit mode.
    pub async fn save(&mut self) -> Result<bool, ProfileError> {
        if self.mode != ProfileMode::Editing {
            return Err(ProfileError::NotEditing);
        }
        let user_id = self.user.as_ref().ok_or(ProfileError::Unauthenticated)?.id;
        let profile = self.profile.as_mut().ok_or(ProfileError::NotLoaded)?;

        let update = ProfileUpdate::from_profile(profile).touched(OffsetDateTime::now_utc());
        let result = self
            .backend
            .update_profiles(&ProfileFilter::Id(user_id), &update)
            .await;

        match result {
            Ok(()) => {
                update.apply_to(profile);
                self.mode = ProfileMode::Display;
                info!(%user_id, "profile saved");
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, %user_id, "profile update failed");
                Ok(false)
            }
        }
    }

    // =========================================================================
    // AVATAR
    // =========================================================================

    /// Open the cropper on an uploaded image.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotEditing`] outside edit mode, [`ProfileError::Crop`]
    /// if the image cannot be decoded.
    pub fn select_image(&mut self, bytes: &[u8], display: Option<DisplaySize>) -> Result<CropView, ProfileError> {
        if self.mode != ProfileMode::Editing {
            return Err(ProfileError::NotEditing);
        }
        let session = CropSession::load(bytes, display).inspect_err(|e| {
            error!(error = %e, "avatar image could not be read");
        })?;
        let view = crop_view(&session);
        self.crop = Some(session);
        Ok(view)
    }

    /// Move/resize the crop selection.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NoCropSession`] if the cropper is not open.
    pub fn adjust_crop(&mut self, selection: Selection) -> Result<Selection, ProfileError> {
        let session = self.crop.as_mut().ok_or(ProfileError::NoCropSession)?;
        Ok(session.set_selection(selection))
    }

    pub fn cancel_crop(&mut self) {
        self.crop = None;
    }

    /// Encode the selection, upload it, and point the row at its public URL.
    ///
    /// Returns the new avatar URL, or `None` when a backend step failed (the
    /// failure is logged). The cropper closes either way once encoding
    /// succeeded.
    ///
    /// # Errors
    ///
    /// [`ProfileError::Crop`] if encoding fails; the cropper stays open.
    pub async fn complete_crop(&mut self) -> Result<Option<String>, ProfileError> {
        let user_id = self.user.as_ref().ok_or(ProfileError::Unauthenticated)?.id;
        let session = self.crop.as_ref().ok_or(ProfileError::NoCropSession)?;
        let cropped = session.confirm().inspect_err(|e| {
            error!(error = %e, "avatar crop failed");
        })?;

        let result = self.replace_avatar(user_id, cropped).await;
        self.crop = None;

        match result {
            Ok(url) => {
                info!(%user_id, %url, "avatar updated");
                Ok(Some(url))
            }
            Err(e) => {
                error!(error = %e, %user_id, "avatar update failed");
                Ok(None)
            }
        }
    }

    async fn replace_avatar(&mut self, user_id: Uuid, cropped: CroppedImage) -> Result<String, BackendError> {
        let path = avatar_path(user_id);
        self.backend
            .upload_object(&self.bucket, &path, CROPPED_CONTENT_TYPE, cropped.bytes)
            .await?;
        let url = self.backend.public_url(&self.bucket, &path);

        let profile = self
            .profile
            .as_mut()
            .ok_or_else(|| BackendError::NotFound(format!("profile {user_id}")))?;
        let update = ProfileUpdate {
            avatar_url: Some(Some(url.clone())),
            ..ProfileUpdate::from_profile(profile).touched(OffsetDateTime::now_utc())
        };
        self.backend
            .update_profiles(&ProfileFilter::Id(user_id), &update)
            .await?;
        update.apply_to(profile);
        self.avatar_url = Some(url.clone());
        Ok(url)
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// Show the reset panel for the profile's email. Returns that email.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NotLoaded`] if no email is known yet.
    pub fn open_password_reset(&mut self) -> Result<String, ProfileError> {
        self.expire_reset_message();
        if let Some(panel) = &self.reset {
            return Ok(panel.email.clone());
        }
        let email = self
            .profile
            .as_ref()
            .map(|p| p.email.clone())
            .or_else(|| self.user.as_ref().and_then(|u| u.email.clone()))
            .ok_or(ProfileError::NotLoaded)?;
        self.reset = Some(ResetPanel { email: email.clone(), message: None, dismiss_at: None });
        Ok(email)
    }

    pub fn close_password_reset(&mut self) {
        self.reset = None;
    }

    /// Ask the backend to email reset instructions. Returns whether the
    /// request went through; the outcome is also shown as the panel message.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NotLoaded`] if no email is known yet.
    pub async fn request_password_reset(&mut self) -> Result<bool, ProfileError> {
        let email = self.open_password_reset()?;
        let sent = match self.auth.reset_password(&email).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "password reset request failed");
                false
            }
        };
        if let Some(panel) = self.reset.as_mut() {
            if sent {
                panel.message = Some(RESET_SENT_MESSAGE);
                panel.dismiss_at = Some(Instant::now() + RESET_MESSAGE_TTL);
            } else {
                panel.message = Some(RESET_FAILED_MESSAGE);
                panel.dismiss_at = None;
            }
        }
        Ok(sent)
    }

    fn expire_reset_message(&mut self) {
        let expired = self
            .reset
            .as_ref()
            .and_then(|panel| panel.dismiss_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.reset = None;
        }
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// End the session and forget the loaded profile. Returns whether the
    /// sign-out succeeded; a failure is logged and nothing changes.
    pub async fn sign_out(&mut self) -> bool {
        match self.auth.sign_out().await {
            Ok(()) => {
                self.clear();
                true
            }
            Err(e) => {
                error!(error = %e, "sign out failed");
                false
            }
        }
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    #[must_use]
    pub fn mode(&self) -> ProfileMode {
        self.mode
    }

    pub fn view(&mut self) -> ProfileView {
        self.expire_reset_message();
        ProfileView {
            loading: self.loading,
            mode: self.mode,
            profile: self.profile.clone(),
            avatar_url: self.avatar_url.clone(),
            crop: self.crop.as_ref().map(crop_view),
            password_reset: self.reset.as_ref().map(|panel| ResetView {
                email: panel.email.clone(),
                message: panel.message.map(str::to_owned),
                failed: panel.message == Some(RESET_FAILED_MESSAGE),
            }),
        }
    }
}

fn crop_view(session: &CropSession) -> CropView {
    CropView {
        natural: session.natural_size(),
        display: session.display_size(),
        selection: session.selection(),
        circular: true,
    }
}

/// Storage path for a new avatar: namespaced by user, random file name.
fn avatar_path(user_id: Uuid) -> String {
    format!("{user_id}/{}.jpg", rand::random::<f64>())
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
