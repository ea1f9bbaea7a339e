// src/sources/nguonc.rs

//! NguonC adapter.
//!
//! Wire shape: string `status` envelope, movie fields named differently
//! from the other sources (`original_name`, `current_episode`,
//! `total_episodes`), episode servers nested inside the movie object as
//! `episodes[].items` with `embed`/`m3u8` link fields, and no explicit
//! airing-status field.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SourceEndpoints;
use crate::error::Result;
use crate::models::{Episode, ListEntry, RawDetail, RawServer};
use crate::utils::resolve_image;

use super::{SourceAdapter, SourceId, get_json};

pub struct NguonCAdapter {
    client: Client,
    endpoints: SourceEndpoints,
}

impl NguonCAdapter {
    pub fn new(client: Client, endpoints: SourceEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn normalize(&self, movie: Movie) -> RawDetail {
        let completed = is_completed(&movie.current_episode, movie.total_episodes);
        let categories = movie.categories();
        let servers = movie
            .episodes
            .into_iter()
            .map(|server| RawServer {
                name: server.server_name,
                episodes: server
                    .items
                    .into_iter()
                    .map(|ep| Episode {
                        name: ep.name,
                        slug: ep.slug,
                        links: [ep.embed, ep.m3u8]
                            .into_iter()
                            .filter(|l| !l.is_empty())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        RawDetail {
            slug: movie.slug,
            name: movie.name,
            origin_name: movie.original_name,
            description: movie.description,
            poster_url: self.resolve_image(&movie.poster_url),
            thumb_url: self.resolve_image(&movie.thumb_url),
            year: movie.year,
            categories,
            countries: Vec::new(),
            episode_current: movie.current_episode,
            episode_total: movie.total_episodes,
            completed,
            servers,
        }
    }
}

/// NguonC reports no airing-status field; completion is derived from the
/// current-episode label or from the announced total.
fn is_completed(current: &str, total: Option<u32>) -> bool {
    let lowered = current.to_lowercase();
    if lowered.contains("hoàn tất") || lowered.contains("hoan tat") || lowered == "full" {
        return true;
    }
    if let Some(total) = total {
        // Only the first contiguous digit run counts; "Tap 12 - 24" must
        // read as episode 12, not 1224.
        let digits: String = current
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(n) = digits.parse::<u32>() {
            return total > 0 && n >= total;
        }
    }
    false
}

#[async_trait]
impl SourceAdapter for NguonCAdapter {
    fn id(&self) -> SourceId {
        SourceId::NguonC
    }

    async fn list_page(&self, page: u64) -> Vec<ListEntry> {
        let url = format!(
            "{}/films/phim-moi-cap-nhat?page={page}",
            self.endpoints.base_url
        );
        match get_json::<ListResponse>(&self.client, &url).await {
            Ok(response) if response.status == "success" => response
                .items
                .into_iter()
                .map(|item| ListEntry {
                    slug: item.slug,
                    name: item.name,
                    episode_current: item.current_episode,
                })
                .collect(),
            Ok(response) => {
                log::warn!(
                    "NguonC list page {page}: upstream status '{}'",
                    response.status
                );
                Vec::new()
            }
            Err(error) => {
                log::warn!("NguonC list page {page} failed: {error}");
                Vec::new()
            }
        }
    }

    async fn fetch_detail(&self, slug: &str) -> Result<Option<RawDetail>> {
        let url = format!("{}/film/{slug}", self.endpoints.base_url);
        let response = match get_json::<DetailResponse>(&self.client, &url).await {
            Ok(response) => response,
            Err(error) => {
                log::debug!("NguonC detail '{slug}' unavailable: {error}");
                return Ok(None);
            }
        };

        if response.status != "success" {
            return Ok(None);
        }
        Ok(response.movie.map(|movie| self.normalize(movie)))
    }

    async fn search(&self, query: &str) -> Vec<ListEntry> {
        let url = format!(
            "{}/films/search?keyword={}",
            self.endpoints.base_url,
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
        );
        match get_json::<ListResponse>(&self.client, &url).await {
            Ok(response) if response.status == "success" => response
                .items
                .into_iter()
                .map(|item| ListEntry {
                    slug: item.slug,
                    name: item.name,
                    episode_current: item.current_episode,
                })
                .collect(),
            Ok(_) => Vec::new(),
            Err(error) => {
                log::warn!("NguonC search '{query}' failed: {error}");
                Vec::new()
            }
        }
    }

    fn resolve_image(&self, path: &str) -> String {
        resolve_image(&self.endpoints.image_root, path)
    }
}

// --- Wire structs ---

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
    slug: String,
    #[serde(default)]
    current_episode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    status: String,
    movie: Option<Movie>,
}

#[derive(Debug, Deserialize)]
struct Movie {
    name: String,
    slug: String,
    #[serde(default)]
    original_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    poster_url: String,
    #[serde(default)]
    thumb_url: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    current_episode: String,
    #[serde(default)]
    total_episodes: Option<u32>,
    #[serde(default)]
    category: serde_json::Value,
    #[serde(default)]
    episodes: Vec<Server>,
}

impl Movie {
    /// NguonC nests genre labels inside a keyed `category` object
    /// (`{"2": {"group": {"name": "The loai"}, "list": [{"name": ...}]}}`).
    /// Pull every `list[].name` out regardless of grouping.
    fn categories(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(groups) = self.category.as_object() {
            for group in groups.values() {
                if let Some(list) = group.get("list").and_then(|l| l.as_array()) {
                    for entry in list {
                        if let Some(name) = entry.get("name").and_then(|n| n.as_str()) {
                            names.push(name.to_string());
                        }
                    }
                }
            }
        }
        names
    }
}

#[derive(Debug, Deserialize)]
struct Server {
    server_name: String,
    #[serde(default)]
    items: Vec<ServerEpisode>,
}

#[derive(Debug, Deserialize)]
struct ServerEpisode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    embed: String,
    #[serde(default)]
    m3u8: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn adapter() -> NguonCAdapter {
        let config = Config::default();
        NguonCAdapter::new(Client::new(), config.sources.nguonc)
    }

    #[test]
    fn parse_detail_with_nested_servers() {
        let json = r#"{
            "status": "success",
            "movie": {
                "name": "Test Movie",
                "slug": "test-movie",
                "original_name": "Test",
                "description": "A test.",
                "poster_url": "https://cdn.example/p.jpg",
                "thumb_url": "t.jpg",
                "year": 2022,
                "current_episode": "Tap 6",
                "total_episodes": 12,
                "category": {
                    "2": {"group": {"name": "The loai"}, "list": [{"name": "Action"}, {"name": "Drama"}]}
                },
                "episodes": [{
                    "server_name": "Server #1",
                    "items": [
                        {"name": "Tap 1", "slug": "tap-1", "embed": "https://e/1", "m3u8": "https://m/1"}
                    ]
                }]
            }
        }"#;

        let response: DetailResponse = serde_json::from_str(json).unwrap();
        let raw = adapter().normalize(response.movie.unwrap());

        assert_eq!(raw.slug, "test-movie");
        assert_eq!(raw.origin_name, "Test");
        assert_eq!(raw.categories, vec!["Action", "Drama"]);
        assert!(!raw.completed);
        assert_eq!(
            raw.thumb_url,
            "https://phim.nguonc.com/public/images/t.jpg"
        );
        assert_eq!(raw.servers[0].episodes[0].links.len(), 2);
    }

    #[test]
    fn completion_derived_from_label() {
        assert!(is_completed("Hoàn tất (12/12)", None));
        assert!(is_completed("Full", None));
        assert!(!is_completed("Tap 6", Some(12)));
    }

    #[test]
    fn completion_derived_from_total() {
        assert!(is_completed("Tap 12", Some(12)));
        assert!(!is_completed("Tap 11", Some(12)));
        assert!(!is_completed("Tap 3", None));
    }

    #[test]
    fn completion_reads_first_digit_run_only() {
        assert!(!is_completed("Tap 12 - 24", Some(24)));
        assert!(is_completed("Tap 24 - 24", Some(24)));
    }
}
