//! Page view-models.
//!
//! Each page keeps the state a browser view would render and exposes the
//! user actions as methods. Routes drive them and serialize their views.

pub mod profile;
pub mod signup;
