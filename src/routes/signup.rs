//! Signup routes — one-shot submit, username lookup, live form websocket.
//!
//! DESIGN
//! ======
//! The websocket owns one `SignupForm` per connection and runs a `select!`
//! loop over:
//! - client messages → field edits / submit, answered with the form state
//! - debounced username results → forwarded as they land
//!
//! Message handling lives in `process_inbound_text` so tests can drive it
//! without a socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::error_response;
use crate::pages::signup::{
    MIN_USERNAME_CHECK_LEN, SignupError, SignupForm, SignupView, UsernameAvailability, username_available,
};
use crate::state::AppState;

/// Where a client goes after a successful signup.
pub const SIGNUP_REDIRECT: &str = "/profile";

#[derive(Deserialize)]
pub struct SignupRequest {
    email: String,
    username: String,
    display_name: String,
    password: String,
    confirm_password: String,
}

#[derive(Deserialize)]
pub struct UsernameQuery {
    username: String,
}

// =============================================================================
// ONE-SHOT
// =============================================================================

/// `POST /api/signup` — validate and register in one request.
pub async fn submit(State(state): State<AppState>, Json(body): Json<SignupRequest>) -> Response {
    let mut form = SignupForm::new(state.backend.clone(), state.auth.clone());
    form.set_email(&body.email);
    form.set_username(&body.username);
    form.set_display_name(&body.display_name);
    form.set_password(&body.password);
    form.set_confirm_password(&body.confirm_password);

    match form.submit_fresh().await {
        Ok(user) => (
            StatusCode::CREATED,
            Json(json!({ "user_id": user.id, "redirect": SIGNUP_REDIRECT })),
        )
            .into_response(),
        Err(e) => signup_error(&e),
    }
}

fn signup_error(err: &SignupError) -> Response {
    let status = match err {
        SignupError::UsernameTaken => StatusCode::CONFLICT,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_response(status, err.to_string())
}

/// `GET /api/signup/username?username=` — immediate availability check.
pub async fn username(State(state): State<AppState>, Query(query): Query<UsernameQuery>) -> Json<UsernameAvailability> {
    let username = query.username.to_lowercase();
    let available = if username.chars().count() < MIN_USERNAME_CHECK_LEN {
        true
    } else {
        username_available(state.backend.as_ref(), &username).await
    };
    Json(UsernameAvailability { username, available })
}

// =============================================================================
// LIVE FORM
// =============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupField {
    Email,
    Username,
    DisplayName,
    Password,
    ConfirmPassword,
}

/// Client → server messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignupCommand {
    Field { field: SignupField, value: String },
    CheckUsername,
    Submit,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignupEvent {
    State(SignupView),
    Availability(UsernameAvailability),
    Submitted { user_id: Uuid, redirect: &'static str },
    Error { message: String },
}

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let mut form = SignupForm::new(state.backend.clone(), state.auth.clone());
    let mut availability = form.subscribe_availability();

    if send_event(&mut socket, &SignupEvent::State(form.view())).await.is_err() {
        return;
    }
    info!(%client_id, "signup ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let mut failed = false;
                        for event in process_inbound_text(&mut form, client_id, &text).await {
                            if send_event(&mut socket, &event).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Ok(()) = availability.changed() => {
                let latest = availability.borrow_and_update().clone();
                if send_event(&mut socket, &SignupEvent::Availability(latest)).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%client_id, "signup ws: client disconnected");
}

/// Apply one inbound message to the form and return the replies.
async fn process_inbound_text(form: &mut SignupForm, client_id: Uuid, text: &str) -> Vec<SignupEvent> {
    let command: SignupCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            warn!(%client_id, error = %e, "signup ws: invalid inbound message");
            return vec![SignupEvent::Error { message: format!("invalid json: {e}") }];
        }
    };

    match command {
        SignupCommand::Field { field, value } => {
            match field {
                SignupField::Email => form.set_email(&value),
                SignupField::Username => form.set_username(&value),
                SignupField::DisplayName => form.set_display_name(&value),
                SignupField::Password => form.set_password(&value),
                SignupField::ConfirmPassword => form.set_confirm_password(&value),
            }
            vec![SignupEvent::State(form.view())]
        }
        SignupCommand::CheckUsername => {
            form.check_username_now().await;
            vec![SignupEvent::State(form.view())]
        }
        SignupCommand::Submit => match form.submit().await {
            Ok(user) => vec![SignupEvent::Submitted { user_id: user.id, redirect: SIGNUP_REDIRECT }],
            Err(e) => vec![SignupEvent::Error { message: e.to_string() }, SignupEvent::State(form.view())],
        },
    }
}

async fn send_event(socket: &mut WebSocket, event: &SignupEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
#[path = "signup_test.rs"]
mod tests;
