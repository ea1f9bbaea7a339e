// src/sources/kkphim.rs

//! KKPhim adapter.
//!
//! Wire shape: string `status` envelope with everything nested under
//! `data.item`, numeric `episode_total`, absolute-or-relative image paths.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SourceEndpoints;
use crate::error::Result;
use crate::models::{Episode, ListEntry, RawDetail, RawServer};
use crate::utils::resolve_image;

use super::{SourceAdapter, SourceId, get_json};

pub struct KkPhimAdapter {
    client: Client,
    endpoints: SourceEndpoints,
}

impl KkPhimAdapter {
    pub fn new(client: Client, endpoints: SourceEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn normalize(&self, item: Item) -> RawDetail {
        let servers = item
            .episodes
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
            slug: item.slug,
            name: item.name,
            origin_name: item.origin_name,
            description: item.content,
            poster_url: self.resolve_image(&item.poster_url),
            thumb_url: self.resolve_image(&item.thumb_url),
            year: item.year,
            categories: item.category.into_iter().map(|c| c.name).collect(),
            countries: item.country.into_iter().map(|c| c.name).collect(),
            episode_current: item.episode_current,
            episode_total: item.episode_total,
            completed: item.status == "completed",
            servers,
        }
    }
}

#[async_trait]
impl SourceAdapter for KkPhimAdapter {
    fn id(&self) -> SourceId {
        SourceId::KkPhim
    }

    async fn list_page(&self, page: u64) -> Vec<ListEntry> {
        let url = format!(
            "{}/danh-sach/phim-moi-cap-nhat?page={page}",
            self.endpoints.base_url
        );
        match get_json::<ListResponse>(&self.client, &url).await {
            Ok(response) => response
                .items
                .into_iter()
                .map(|item| ListEntry {
                    slug: item.slug,
                    name: item.name,
                    episode_current: item.episode_current,
                })
                .collect(),
            Err(error) => {
                log::warn!("KKPhim list page {page} failed: {error}");
                Vec::new()
            }
        }
    }

    async fn fetch_detail(&self, slug: &str) -> Result<Option<RawDetail>> {
        let url = format!("{}/v1/api/phim/{slug}", self.endpoints.base_url);
        let response = match get_json::<DetailResponse>(&self.client, &url).await {
            Ok(response) => response,
            Err(error) => {
                log::debug!("KKPhim detail '{slug}' unavailable: {error}");
                return Ok(None);
            }
        };

        if response.status != "success" {
            return Ok(None);
        }
        Ok(response
            .data
            .and_then(|d| d.item)
            .map(|item| self.normalize(item)))
    }

    async fn search(&self, query: &str) -> Vec<ListEntry> {
        let url = format!(
            "{}/v1/api/tim-kiem?keyword={}",
            self.endpoints.base_url,
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
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
                log::warn!("KKPhim search '{query}' failed: {error}");
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
    status: String,
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    item: Option<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
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
    episode_total: Option<u32>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    category: Vec<Named>,
    #[serde(default)]
    country: Vec<Named>,
    #[serde(default)]
    episodes: Vec<Server>,
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
