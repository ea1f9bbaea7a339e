// src/sources/mod.rs

//! Upstream source adapters.
//!
//! Three independently operated catalog APIs publish overlapping sets of
//! the same logical items with different wire formats. Each adapter
//! flattens its source's shape into [`RawDetail`] / [`ListEntry`] so the
//! rest of the pipeline never sees a wire format.
//!
//! Listing fails soft: a bad page from one source logs a warning and
//! yields an empty page so the other sources keep crawling.

mod kkphim;
mod nguonc;
mod ophim;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::models::{ListEntry, RawDetail};

pub use kkphim::KkPhimAdapter;
pub use nguonc::NguonCAdapter;
pub use ophim::OphimAdapter;

/// Identifier for one upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Ophim,
    KkPhim,
    NguonC,
}

impl SourceId {
    /// All sources, highest priority first.
    pub const ALL: [SourceId; 3] = [SourceId::Ophim, SourceId::KkPhim, SourceId::NguonC];

    /// Merge priority. Lower wins: stream groups are sorted on this, so
    /// consumers reading index 0 deterministically get the preferred
    /// source regardless of adapter processing order.
    pub fn priority(self) -> u8 {
        match self {
            SourceId::Ophim => 0,
            SourceId::KkPhim => 1,
            SourceId::NguonC => 2,
        }
    }

    /// Short tag used to namespace stream group labels.
    pub fn tag(self) -> &'static str {
        match self {
            SourceId::Ophim => "Ophim",
            SourceId::KkPhim => "KKPhim",
            SourceId::NguonC => "NguonC",
        }
    }

    /// Namespaced stream group label, so "Vietsub #1" from two sources
    /// never collides.
    pub fn group_label(self, server_name: &str) -> String {
        format!("{} - {}", self.tag(), server_name)
    }

    /// Parse a CLI / API source hint.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ophim" => Some(SourceId::Ophim),
            "kkphim" => Some(SourceId::KkPhim),
            "nguonc" => Some(SourceId::NguonC),
            _ => None,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Uniform interface over the three upstream catalog APIs.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    /// List one page of recently-updated items.
    ///
    /// Fails soft: any network or parse error yields an empty page.
    async fn list_page(&self, page: u64) -> Vec<ListEntry>;

    /// Fetch full detail for one slug.
    ///
    /// `Ok(None)` covers both "the source has no such item" and "the
    /// response was malformed"; the orchestrator's retry logic keys on
    /// this single signal.
    async fn fetch_detail(&self, slug: &str) -> Result<Option<RawDetail>>;

    /// Name-based search against the source's current listing.
    ///
    /// Fails soft like `list_page`.
    async fn search(&self, query: &str) -> Vec<ListEntry>;

    /// Resolve a possibly relative image path to an absolute URL.
    fn resolve_image(&self, path: &str) -> String;
}

/// Create a configured HTTP client shared by all adapters.
pub fn create_client(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.http.user_agent)
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()?;
    Ok(client)
}

/// Build all three adapters in priority order.
pub fn build_adapters(config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let client = create_client(config)?;
    Ok(vec![
        Arc::new(OphimAdapter::new(client.clone(), config.sources.ophim.clone())),
        Arc::new(KkPhimAdapter::new(client.clone(), config.sources.kkphim.clone())),
        Arc::new(NguonCAdapter::new(client, config.sources.nguonc.clone())),
    ])
}

/// GET a JSON document from an upstream endpoint.
pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json::<T>().await?)
}

/// Parse a loosely-typed episode-total field ("12", "12 Tap", "") into a count.
pub(crate) fn parse_episode_total(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
