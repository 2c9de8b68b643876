//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the backend client, the process-wide auth store, and the profile
//! page view-model. The page sits behind an async mutex so its operations run
//! one at a time, in request order.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::pages::profile::ProfilePage;
use crate::services::auth::AuthStore;

/// Clone is required by Axum; every field is Arc-backed.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub auth: AuthStore,
    pub profile: Arc<Mutex<ProfilePage>>,
}

impl AppState {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, auth: AuthStore, avatar_bucket: &str) -> Self {
        let page = ProfilePage::new(Arc::clone(&backend), auth.clone(), avatar_bucket);
        Self { backend, auth, profile: Arc::new(Mutex::new(page)) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
