//! App-wide services used by pages and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Services hold logic that is not tied to one view: the auth session
//! holder, the password classifier, and the input debouncer.

pub mod auth;
pub mod debounce;
pub mod password;
