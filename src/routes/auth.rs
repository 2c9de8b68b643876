//! Auth routes — session state, sign-in, sign-out, password reset.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use super::error_response;
use crate::services::auth::{AuthError, AuthState};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email address or username.
    credential: String,
    password: String,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    email: String,
}

/// `GET /api/auth/session` — current identity and loading flag.
pub async fn session(State(state): State<AppState>) -> Json<AuthState> {
    Json(state.auth.state())
}

/// `POST /api/auth/login` — sign in by email or username.
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    match state.auth.sign_in(&body.credential, &body.password).await {
        Ok(user) => Json(user).into_response(),
        Err(e @ AuthError::InvalidCredentials) => error_response(StatusCode::UNAUTHORIZED, e.to_string()),
        Err(AuthError::Backend(e)) => {
            tracing::error!(error = %e, "sign-in failed");
            error_response(StatusCode::BAD_GATEWAY, "Failed to sign in")
        }
    }
}

/// `POST /api/auth/logout` — end the session.
pub async fn logout(State(state): State<AppState>) -> Response {
    match state.auth.sign_out().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "sign-out failed");
            error_response(StatusCode::BAD_GATEWAY, "Failed to sign out")
        }
    }
}

/// `POST /api/auth/password-reset` — email reset instructions.
pub async fn password_reset(State(state): State<AppState>, Json(body): Json<ResetRequest>) -> Response {
    match state.auth.reset_password(&body.email).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "password reset failed");
            error_response(StatusCode::BAD_GATEWAY, "Failed to send reset instructions")
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
