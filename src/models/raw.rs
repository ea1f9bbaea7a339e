//! Ephemeral adapter output structures.
//!
//! `RawDetail` is what one upstream fetch yields after normalization.
//! It is reconciliation input only and is never persisted as-is.

use serde::{Deserialize, Serialize};

use crate::models::Episode;

/// A lightweight page-listing / search-result entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    pub slug: String,
    pub name: String,

    /// Current-episode label if the listing carries one
    pub episode_current: Option<String>,
}

/// One upstream server's episode list, before namespacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawServer {
    /// Server name as reported by the source (e.g. "Vietsub #1")
    pub name: String,
    pub episodes: Vec<Episode>,
}

/// Normalized detail payload for one item from one source.
#[derive(Debug, Clone, Default)]
pub struct RawDetail {
    pub slug: String,
    pub name: String,
    pub origin_name: String,
    pub description: String,

    /// Already resolved to absolute URLs by the adapter
    pub poster_url: String,
    pub thumb_url: String,

    pub year: Option<u16>,
    pub categories: Vec<String>,
    pub countries: Vec<String>,

    /// Current-episode label (e.g. "Tap 12", "Hoan Tat (12/12)")
    pub episode_current: String,
    pub episode_total: Option<u32>,

    /// Whether the source reports the item as finished airing
    pub completed: bool,

    pub servers: Vec<RawServer>,
}
