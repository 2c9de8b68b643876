//! Backend configuration parsed from environment variables.

use super::types::BackendError;

pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL, without a trailing slash.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// Storage bucket that holds avatar images.
    pub avatar_bucket: String,
    /// Origin used to build email redirect links. `None` lets the backend
    /// fall back to its own configured site URL.
    pub site_url: Option<String>,
    pub timeouts: BackendTimeouts,
}

impl BackendConfig {
    /// Build typed backend config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `AVATAR_BUCKET`: default `avatars`
    /// - `SITE_URL`: origin for verification and reset redirects
    /// - `BACKEND_REQUEST_TIMEOUT_SECS`: default 30
    /// - `BACKEND_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if a required variable is missing.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BackendConfig::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if a required variable is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BackendError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = required(&lookup, "SUPABASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let anon_key = required(&lookup, "SUPABASE_ANON_KEY")?;
        let avatar_bucket = lookup("AVATAR_BUCKET")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AVATAR_BUCKET.to_owned());
        let site_url = lookup("SITE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_owned())
            .filter(|v| !v.is_empty());
        let timeouts = BackendTimeouts {
            request_secs: parse_u64(&lookup, "BACKEND_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(&lookup, "BACKEND_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { url, anon_key, avatar_bucket, site_url, timeouts })
    }

    /// Redirect target for the account verification email.
    #[must_use]
    pub fn signup_redirect(&self) -> Option<String> {
        self.site_url
            .as_ref()
            .map(|site| format!("{site}/auth/callback"))
    }

    /// Redirect target for the password-reset email.
    #[must_use]
    pub fn reset_redirect(&self) -> Option<String> {
        self.site_url
            .as_ref()
            .map(|site| format!("{site}/auth/reset-password"))
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, BackendError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BackendError::Config(format!("{key} not set")))
}

fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
