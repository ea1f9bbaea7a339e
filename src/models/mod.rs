// src/models/mod.rs

//! Domain models for the sync application.

mod item;
mod raw;

pub use item::{CanonicalItem, Episode, ItemStatus, StreamGroup};
pub use raw::{ListEntry, RawDetail, RawServer};
