//! In-memory backend used by unit and route tests.
//!
//! Behaves like the hosted service for the parts the app relies on: signup
//! creates the account and its profile row, password sign-in checks the stored
//! password, and every call is recorded so tests can assert on what reached
//! the backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::types::{AuthChange, AuthEvent, Backend, BackendError, Identity, Profile, ProfileFilter, ProfileUpdate};

pub const MEMORY_BASE_URL: &str = "http://backend.test";

#[derive(Default)]
struct Inner {
    /// email -> (identity, password)
    accounts: HashMap<String, (Identity, String)>,
    profiles: Vec<Profile>,
    session: Option<Identity>,
    objects: HashMap<String, (String, Vec<u8>)>,
    calls: Vec<String>,
    reset_emails: Vec<String>,
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<AuthChange>,
    pub fail_selects: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_uploads: AtomicBool,
    pub fail_resets: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
            fail_selects: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
            fail_resets: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory backend mutex poisoned")
    }

    fn record(&self, call: &str) {
        self.lock().calls.push(call.to_owned());
    }

    /// Register an account and its profile row directly, bypassing signup.
    pub fn seed_account(&self, email: &str, password: &str, username: &str, display_name: &str) -> Identity {
        let identity = Identity { id: Uuid::new_v4(), email: Some(email.to_owned()) };
        let mut inner = self.lock();
        inner
            .accounts
            .insert(email.to_owned(), (identity.clone(), password.to_owned()));
        inner.profiles.push(Profile {
            id: identity.id,
            email: email.to_owned(),
            username: username.to_owned(),
            display_name: display_name.to_owned(),
            full_name: None,
            avatar_url: None,
            address: None,
            phone: None,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        });
        identity
    }

    /// Install `identity` as the current session without notifying anyone.
    pub fn set_session(&self, identity: Option<Identity>) {
        self.lock().session = identity;
    }

    /// Push a session-change notification as the hosted service would.
    pub fn emit(&self, change: AuthChange) {
        if change.event == AuthEvent::SignedOut {
            self.lock().session = None;
        } else {
            self.lock().session.clone_from(&change.user);
        }
        let _ = self.changes.send(change);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn profile_by_email(&self, email: &str) -> Option<Profile> {
        self.lock()
            .profiles
            .iter()
            .find(|p| p.email == email)
            .cloned()
    }

    #[must_use]
    pub fn profile_by_id(&self, id: Uuid) -> Option<Profile> {
        self.lock()
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<(String, Vec<u8>)> {
        self.lock()
            .objects
            .get(&format!("{bucket}/{path}"))
            .cloned()
    }

    #[must_use]
    pub fn object_keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    #[must_use]
    pub fn reset_emails(&self) -> Vec<String> {
        self.lock().reset_emails.clone()
    }
}

fn injected(flag: &AtomicBool, what: &str) -> Result<(), BackendError> {
    if flag.load(Ordering::SeqCst) {
        return Err(BackendError::Api { status: 500, message: format!("injected {what} failure") });
    }
    Ok(())
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Identity>, BackendError> {
        Ok(self.lock().session.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.record("sign_in_with_password");
        let identity = {
            let mut inner = self.lock();
            let identity = match inner.accounts.get(email) {
                Some((identity, stored)) if stored == password => identity.clone(),
                _ => return Err(BackendError::InvalidCredentials),
            };
            inner.session = Some(identity.clone());
            identity
        };
        let _ = self
            .changes
            .send(AuthChange { event: AuthEvent::SignedIn, user: Some(identity.clone()) });
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _redirect_to: Option<&str>,
    ) -> Result<Identity, BackendError> {
        self.record("sign_up");
        if self.lock().accounts.contains_key(email) {
            return Err(BackendError::Api { status: 422, message: "User already registered".to_owned() });
        }
        let identity = Identity { id: Uuid::new_v4(), email: Some(email.to_owned()) };
        let mut inner = self.lock();
        inner
            .accounts
            .insert(email.to_owned(), (identity.clone(), password.to_owned()));
        // The hosted service creates the profile row from a signup trigger;
        // the name columns stay null until signup records them.
        inner.profiles.push(Profile {
            id: identity.id,
            email: email.to_owned(),
            username: String::new(),
            display_name: String::new(),
            full_name: None,
            avatar_url: None,
            address: None,
            phone: None,
            updated_at: OffsetDateTime::now_utc(),
        });
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.record("sign_out");
        self.lock().session = None;
        let _ = self
            .changes
            .send(AuthChange { event: AuthEvent::SignedOut, user: None });
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, _redirect_to: Option<&str>) -> Result<(), BackendError> {
        self.record("reset_password_for_email");
        injected(&self.fail_resets, "reset")?;
        self.lock().reset_emails.push(email.to_owned());
        Ok(())
    }

    async fn select_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, BackendError> {
        self.record("select_profiles");
        injected(&self.fail_selects, "select")?;
        Ok(self
            .lock()
            .profiles
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn update_profiles(&self, filter: &ProfileFilter, update: &ProfileUpdate) -> Result<(), BackendError> {
        self.record("update_profiles");
        injected(&self.fail_updates, "update")?;
        let mut inner = self.lock();
        if let Some(username) = &update.username {
            let taken = inner
                .profiles
                .iter()
                .any(|p| p.username == *username && !filter.matches(p));
            if taken {
                return Err(BackendError::Api {
                    status: 409,
                    message: "duplicate key value violates unique constraint \"profiles_username_key\"".to_owned(),
                });
            }
        }
        for profile in inner.profiles.iter_mut().filter(|p| filter.matches(p)) {
            update.apply_to(profile);
        }
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError> {
        self.record("upload_object");
        injected(&self.fail_uploads, "upload")?;
        let key = format!("{bucket}/{path}");
        let mut inner = self.lock();
        if inner.objects.contains_key(&key) {
            return Err(BackendError::Api { status: 409, message: "The resource already exists".to_owned() });
        }
        inner
            .objects
            .insert(key, (content_type.to_owned(), bytes));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{MEMORY_BASE_URL}/storage/v1/object/public/{bucket}/{path}")
    }
}
