//! Reusable UI components that are not tied to a single page.

pub mod image_cropper;
