// src/sources/ophim.rs

//! Ophim adapter.
//!
//! Wire shape: boolean `status` envelope, `movie` object with stringly
//! numeric fields, episode servers under `episodes[].server_data`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SourceEndpoints;
use crate::error::Result;
use crate::models::{Episode, ListEntry, RawDetail, RawServer};
use crate::utils::resolve_image;

use super::{SourceAdapter, SourceId, get_json, parse_episode_total};

pub struct OphimAdapter {
    client: Client,
    endpoints: SourceEndpoints,
}

impl OphimAdapter {
    pub fn new(client: Client, endpoints: SourceEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn normalize(&self, movie: Movie, episodes: Vec<Server>) -> RawDetail {
        let servers = episodes
            .into_iter()
            .map(|server| RawServer {
                name: server.server_name,
                episodes: server
                    .server_data
                    .into_iter()
                    .map(|ep| Episode {
                        name: ep.name,
                        slug: ep.slug,
                        links: [ep.link_embed, ep.link_m3u8]
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
            origin_name: movie.origin_name,
            description: movie.content,
            poster_url: self.resolve_image(&movie.poster_url),
            thumb_url: self.resolve_image(&movie.thumb_url),
            year: movie.year,
            categories: movie.category.into_iter().map(|c| c.name).collect(),
            countries: movie.country.into_iter().map(|c| c.name).collect(),
            episode_current: movie.episode_current,
            episode_total: parse_episode_total(&movie.episode_total),
            completed: movie.status == "completed",
            servers,
        }
    }
}

#[async_trait]
impl SourceAdapter for OphimAdapter {
    fn id(&self) -> SourceId {
        SourceId::Ophim
    }

    async fn list_page(&self, page: u64) -> Vec<ListEntry> {
        let url = format!(
            "{}/danh-sach/phim-moi-cap-nhat?page={page}",
            self.endpoints.base_url
        );
        match get_json::<ListResponse>(&self.client, &url).await {
            Ok(response) if response.status => response
                .items
                .into_iter()
                .map(|item| ListEntry {
                    slug: item.slug,
                    name: item.name,
                    episode_current: item.episode_current,
                })
                .collect(),
            Ok(_) => {
                log::warn!("Ophim list page {page}: upstream reported failure");
                Vec::new()
            }
            Err(error) => {
                log::warn!("Ophim list page {page} failed: {error}");
                Vec::new()
            }
        }
    }

    async fn fetch_detail(&self, slug: &str) -> Result<Option<RawDetail>> {
        let url = format!("{}/phim/{slug}", self.endpoints.base_url);
        let response = match get_json::<DetailResponse>(&self.client, &url).await {
            Ok(response) => response,
            Err(error) => {
                log::debug!("Ophim detail '{slug}' unavailable: {error}");
                return Ok(None);
            }
        };

        match response.movie {
            Some(movie) if response.status => {
                Ok(Some(self.normalize(movie, response.episodes)))
            }
            _ => Ok(None),
        }
    }

    async fn search(&self, query: &str) -> Vec<ListEntry> {
        let url = format!(
            "{}/v1/api/tim-kiem?keyword={}",
            self.endpoints.base_url,
            urlencode(query)
        );
        match get_json::<SearchResponse>(&self.client, &url).await {
            Ok(response) => response
                .data
                .items
                .into_iter()
                .map(|item| ListEntry {
                    slug: item.slug,
                    name: item.name,
                    episode_current: item.episode_current,
                })
                .collect(),
            Err(error) => {
                log::warn!("Ophim search '{query}' failed: {error}");
                Vec::new()
            }
        }
    }

    fn resolve_image(&self, path: &str) -> String {
        resolve_image(&self.endpoints.image_root, path)
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

// --- Wire structs ---

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
    slug: String,
    #[serde(default)]
    episode_current: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    status: bool,
    movie: Option<Movie>,
    #[serde(default)]
    episodes: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct Movie {
    name: String,
    slug: String,
    #[serde(default)]
    origin_name: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    poster_url: String,
    #[serde(default)]
    thumb_url: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    episode_current: String,
    #[serde(default)]
    episode_total: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    category: Vec<Named>,
    #[serde(default)]
    country: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Server {
    server_name: String,
    #[serde(default)]
    server_data: Vec<ServerEpisode>,
}

#[derive(Debug, Deserialize)]
struct ServerEpisode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    link_embed: String,
    #[serde(default)]
    link_m3u8: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<ListItem>,
}
