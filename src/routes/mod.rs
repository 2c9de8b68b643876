//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the JSON API and the live signup websocket under a
//! single Axum router. When `STATIC_DIR` is set, the browser front-end is
//! served from it for every path the API does not claim.

pub mod auth;
pub mod profile;
pub mod signup;

use std::path::PathBuf;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Largest accepted avatar source image.
pub const AVATAR_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// API routes: auth, signup, profile.
pub fn api_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/password-reset", post(auth::password_reset))
        .route("/api/signup", post(signup::submit))
        .route("/api/signup/username", get(signup::username))
        .route("/api/signup/ws", get(signup::handle_ws))
        .route("/api/profile", get(profile::show).patch(profile::save))
        .route("/api/profile/edit", post(profile::toggle_edit))
        .route(
            "/api/profile/avatar",
            post(profile::select_image)
                .delete(profile::cancel_crop)
                .layer(DefaultBodyLimit::max(AVATAR_UPLOAD_LIMIT)),
        )
        .route("/api/profile/avatar/selection", put(profile::adjust_crop))
        .route("/api/profile/avatar/confirm", post(profile::complete_crop))
        .route(
            "/api/profile/password-reset",
            post(profile::password_reset).delete(profile::close_password_reset),
        )
        .route("/api/profile/sign-out", post(profile::sign_out))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Full app: API routes plus the static front-end when configured.
pub fn app(state: AppState) -> Router {
    let api = api_routes(state);
    match static_dir() {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "serving static front-end");
            api.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        }
        None => api,
    }
}

fn static_dir() -> Option<PathBuf> {
    std::env::var("STATIC_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// JSON `{ "error": message }` with `status`.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// TEST SUPPORT
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::{Request, StatusCode};
    use serde::Serialize;
    use serde_json::Value;
    use tower::ServiceExt;

    pub fn json_request<B: Serialize>(method: &str, uri: &str, body: &B) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    /// Send one request and decode the body as JSON (`Null` when empty).
    pub async fn call(router: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
