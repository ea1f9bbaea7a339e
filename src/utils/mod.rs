// src/utils/mod.rs

//! Shared utilities.

pub mod url;

pub use url::resolve_image;
