//! Profile routes — drive the shared `ProfilePage` and return its view.
//!
//! Every handler except sign-out first makes sure the page is loaded for the
//! current identity; without one the answer is 401 with a login redirect.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OwnedMutexGuard;

use super::error_response;
use crate::components::image_cropper::{CropError, DisplaySize, Selection};
use crate::pages::profile::{ProfileEdits, ProfileError, ProfileMode, ProfilePage, RESET_FAILED_MESSAGE};
use crate::state::AppState;

/// Where an unauthenticated client is sent.
pub const LOGIN_REDIRECT: &str = "/login";

#[derive(Debug, Default, Deserialize)]
pub struct AvatarQuery {
    display_width: Option<u32>,
    display_height: Option<u32>,
}

impl AvatarQuery {
    fn display(&self) -> Option<DisplaySize> {
        Some(DisplaySize { width: self.display_width?, height: self.display_height? })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn loaded_page(state: &AppState) -> Result<OwnedMutexGuard<ProfilePage>, Response> {
    let mut page = Arc::clone(&state.profile).lock_owned().await;
    page.ensure_loaded().await.map_err(|e| profile_error(&e))?;
    Ok(page)
}

fn profile_error(err: &ProfileError) -> Response {
    let status = match err {
        ProfileError::Unauthenticated => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": err.to_string(), "redirect": LOGIN_REDIRECT })),
            )
                .into_response();
        }
        ProfileError::NotLoaded => StatusCode::NOT_FOUND,
        ProfileError::NotEditing | ProfileError::NoCropSession => StatusCode::CONFLICT,
        ProfileError::Crop(
            CropError::Decode(_) | CropError::EmptySurface { .. } | CropError::DisplayTooLarge { .. },
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        ProfileError::Crop(CropError::Encode(_) | CropError::Resample(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/profile` — load if needed and return the page view.
pub async fn show(State(state): State<AppState>) -> Response {
    match loaded_page(&state).await {
        Ok(mut page) => Json(page.view()).into_response(),
        Err(response) => response,
    }
}

/// `POST /api/profile/edit` — toggle edit mode.
pub async fn toggle_edit(State(state): State<AppState>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    match page.toggle_edit() {
        Ok(_) => Json(page.view()).into_response(),
        Err(e) => profile_error(&e),
    }
}

/// `PATCH /api/profile` — apply field edits and save them.
pub async fn save(State(state): State<AppState>, Json(edits): Json<ProfileEdits>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    if page.mode() == ProfileMode::Display {
        if let Err(e) = page.toggle_edit() {
            return profile_error(&e);
        }
    }
    if let Err(e) = page.apply_edits(edits) {
        return profile_error(&e);
    }
    match page.save().await {
        Ok(true) => Json(page.view()).into_response(),
        Ok(false) => error_response(StatusCode::BAD_GATEWAY, "Failed to update profile"),
        Err(e) => profile_error(&e),
    }
}

/// `POST /api/profile/avatar` — raw image body; opens the cropper.
pub async fn select_image(State(state): State<AppState>, Query(query): Query<AvatarQuery>, body: Bytes) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    match page.select_image(&body, query.display()) {
        Ok(crop) => Json(crop).into_response(),
        Err(e) => profile_error(&e),
    }
}

/// `PUT /api/profile/avatar/selection` — move or resize the selection.
pub async fn adjust_crop(State(state): State<AppState>, Json(selection): Json<Selection>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    match page.adjust_crop(selection) {
        Ok(applied) => Json(applied).into_response(),
        Err(e) => profile_error(&e),
    }
}

/// `DELETE /api/profile/avatar` — close the cropper without changes.
pub async fn cancel_crop(State(state): State<AppState>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    page.cancel_crop();
    Json(page.view()).into_response()
}

/// `POST /api/profile/avatar/confirm` — crop, upload, and update the row.
pub async fn complete_crop(State(state): State<AppState>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    match page.complete_crop().await {
        Ok(Some(_)) => Json(page.view()).into_response(),
        Ok(None) => error_response(StatusCode::BAD_GATEWAY, "Failed to update avatar"),
        Err(e) => profile_error(&e),
    }
}

/// `POST /api/profile/password-reset` — email reset instructions.
pub async fn password_reset(State(state): State<AppState>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    match page.request_password_reset().await {
        Ok(true) => Json(page.view()).into_response(),
        Ok(false) => error_response(StatusCode::BAD_GATEWAY, RESET_FAILED_MESSAGE),
        Err(e) => profile_error(&e),
    }
}

/// `DELETE /api/profile/password-reset` — hide the reset panel.
pub async fn close_password_reset(State(state): State<AppState>) -> Response {
    let mut page = match loaded_page(&state).await {
        Ok(page) => page,
        Err(response) => return response,
    };
    page.close_password_reset();
    Json(page.view()).into_response()
}

/// `POST /api/profile/sign-out` — end the session.
pub async fn sign_out(State(state): State<AppState>) -> Response {
    let mut page = Arc::clone(&state.profile).lock_owned().await;
    if page.sign_out().await {
        Json(json!({ "redirect": LOGIN_REDIRECT })).into_response()
    } else {
        error_response(StatusCode::BAD_GATEWAY, "Failed to sign out")
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
