//! Backend — the hosted auth/database/storage service.
//!
//! DESIGN
//! ======
//! Everything the app persists lives in the hosted service: accounts and
//! sessions (auth), the `profiles` table (rows), and avatar images (storage).
//! `Backend` is the single trait the rest of the crate depends on;
//! `SupabaseClient` speaks the service's REST API and `MemoryBackend` stands in
//! for it under test.

pub mod config;
#[cfg(test)]
pub mod memory;
pub mod supabase;
pub mod types;

use std::sync::Arc;

use config::BackendConfig;
pub use types::{AuthChange, AuthEvent, Backend, BackendError, Identity, Profile, ProfileFilter, ProfileUpdate};

/// Build the REST client for `config` behind the `Backend` trait object the
/// rest of the app holds.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
    let client = supabase::SupabaseClient::new(config)?;
    Ok(Arc::new(client))
}
