//! Supabase REST client.
//!
//! Thin HTTP wrapper over the three services the app needs: GoTrue
//! (`/auth/v1`), PostgREST (`/rest/v1`) and Storage (`/storage/v1`). The
//! session lives in memory for the lifetime of the process and every change is
//! pushed to `subscribe()` listeners. Response parsing is kept in free
//! functions so it can be tested without a network.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use tokio::sync::{RwLock, broadcast};

use super::config::BackendConfig;
use super::types::{AuthChange, AuthEvent, Backend, BackendError, Identity, Profile, ProfileFilter, ProfileUpdate};

const PROFILES_TABLE: &str = "profiles";
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid login credentials";
const AUTH_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    changes: broadcast::Sender<AuthChange>,
}

impl SupabaseClient {
    /// Build a client for the project described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        let (changes, _) = broadcast::channel(AUTH_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(None),
            changes,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    fn request(&self, method: Method, url: &str, bearer: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Access token of the current session, or the anon key when signed out.
    async fn bearer(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token.clone())
    }

    async fn store_session(&self, session: Session) {
        let user = session.user.clone();
        *self.session.write().await = Some(session);
        // No receivers is fine: nobody is listening yet.
        let _ = self
            .changes
            .send(AuthChange { event: AuthEvent::SignedIn, user: Some(user) });
    }
}

async fn send(builder: reqwest::RequestBuilder) -> Result<String, BackendError> {
    let response = builder
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;
    if !(200..300).contains(&status) {
        return Err(parse_error(status, &text));
    }
    Ok(text)
}

#[async_trait::async_trait]
impl Backend for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Identity>, BackendError> {
        Ok(self.session.read().await.as_ref().map(|s| s.user.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let url = self.endpoint("/auth/v1/token");
        let body = send(
            self.request(Method::POST, &url, &self.anon_key)
                .query(&[("grant_type", "password")])
                .json(&serde_json::json!({ "email": email, "password": password })),
        )
        .await?;
        let session = parse_session(&body)?;
        let user = session.user.clone();
        self.store_session(session).await;
        Ok(user)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<Identity, BackendError> {
        let url = self.endpoint("/auth/v1/signup");
        let mut builder = self
            .request(Method::POST, &url, &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }));
        if let Some(redirect) = redirect_to {
            builder = builder.query(&[("redirect_to", redirect)]);
        }
        let body = send(builder).await?;
        let (user, session) = parse_signup(&body)?;
        if let Some(session) = session {
            self.store_session(session).await;
        }
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        let _ = self
            .changes
            .send(AuthChange { event: AuthEvent::SignedOut, user: None });

        // The local session is already gone, so a failed revoke is only logged.
        let url = self.endpoint("/auth/v1/logout");
        match send(self.request(Method::POST, &url, &session.access_token)).await {
            Ok(_) | Err(BackendError::Api { status: 401 | 403 | 404, .. }) => {}
            Err(e) => tracing::warn!(error = %e, "remote logout failed; local session cleared"),
        }
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError> {
        let url = self.endpoint("/auth/v1/recover");
        let mut builder = self
            .request(Method::POST, &url, &self.anon_key)
            .json(&serde_json::json!({ "email": email }));
        if let Some(redirect) = redirect_to {
            builder = builder.query(&[("redirect_to", redirect)]);
        }
        send(builder).await?;
        Ok(())
    }

    async fn select_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, BackendError> {
        let url = self.endpoint(&format!("/rest/v1/{PROFILES_TABLE}"));
        let bearer = self.bearer().await;
        let (column, value) = filter_pair(filter);
        let body = send(
            self.request(Method::GET, &url, &bearer)
                .query(&[("select", "*")])
                .query(&[(column, value)]),
        )
        .await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn update_profiles(&self, filter: &ProfileFilter, update: &ProfileUpdate) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("/rest/v1/{PROFILES_TABLE}"));
        let bearer = self.bearer().await;
        let (column, value) = filter_pair(filter);
        send(
            self.request(Method::PATCH, &url, &bearer)
                .query(&[(column, value)])
                .header("Prefer", "return=minimal")
                .json(update),
        )
        .await?;
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("/storage/v1/object/{bucket}/{path}"));
        let bearer = self.bearer().await;
        send(
            self.request(Method::POST, &url, &bearer)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .header("x-upsert", "false")
                .body(bytes),
        )
        .await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        public_object_url(&self.url, bucket, path)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct Session {
    access_token: String,
    user: Identity,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_session(json: &str) -> Result<Session, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Signup answers with a session when email confirmation is disabled, and
/// with the bare user (or `{ user, session: null }`) otherwise.
fn parse_signup(json: &str) -> Result<(Identity, Option<Session>), BackendError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))?;
    if value.get("access_token").is_some() {
        let session: Session = serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))?;
        return Ok((session.user.clone(), Some(session)));
    }
    let user = value.get("user").cloned().unwrap_or(value);
    let identity: Identity = serde_json::from_value(user).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok((identity, None))
}

/// Turn a non-success response into a [`BackendError`]. The services disagree
/// on the message field name, so the first one present wins.
fn parse_error(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.to_owned());

    if message == INVALID_CREDENTIALS_MESSAGE {
        return BackendError::InvalidCredentials;
    }
    BackendError::Api { status, message }
}

/// PostgREST equality filter as a query pair, e.g. `("username", "eq.ada")`.
fn filter_pair(filter: &ProfileFilter) -> (&'static str, String) {
    (filter.column(), format!("eq.{}", filter.value()))
}

fn public_object_url(base_url: &str, bucket: &str, path: &str) -> String {
    format!("{base_url}/storage/v1/object/public/{bucket}/{path}")
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
