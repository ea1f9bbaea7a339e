// src/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Sync pacing, concurrency and retry settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Cold-start popularity seeding range
    #[serde(default)]
    pub popularity: PopularityConfig,

    /// Upstream source endpoints
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.sync.max_concurrent == 0 {
            return Err(AppError::config("sync.max_concurrent must be > 0"));
        }
        if self.sync.retry_limit == 0 {
            return Err(AppError::config("sync.retry_limit must be > 0"));
        }
        if self.popularity.seed_min > self.popularity.seed_max {
            return Err(AppError::config(
                "popularity.seed_min must be <= popularity.seed_max",
            ));
        }
        for (name, source) in [
            ("ophim", &self.sources.ophim),
            ("kkphim", &self.sources.kkphim),
            ("nguonc", &self.sources.nguonc),
        ] {
            if source.base_url.trim().is_empty() {
                return Err(AppError::config(format!(
                    "sources.{name}.base_url is empty"
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for upstream requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Sync pacing, concurrency and retry settings.
///
/// Concurrency and pacing here are a rate-limit courtesy toward the
/// upstream hosts, not a throughput knob. Raising `max_concurrent` risks
/// upstream bans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// In-flight detail fetches per batch
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound of the random delay before each detail fetch, in ms
    #[serde(default = "defaults::request_jitter")]
    pub request_jitter_ms: u64,

    /// Fixed pause between batches, in ms
    #[serde(default = "defaults::batch_pause")]
    pub batch_pause_ms: u64,

    /// Detail fetch attempts per item before blacklisting
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    /// Base delay between retries, in ms (grows linearly per attempt)
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Trailing window for in-progress watchers to notify, in days
    #[serde(default = "defaults::notify_window")]
    pub notify_window_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            request_jitter_ms: defaults::request_jitter(),
            batch_pause_ms: defaults::batch_pause(),
            retry_limit: defaults::retry_limit(),
            retry_delay_ms: defaults::retry_delay(),
            notify_window_days: defaults::notify_window(),
        }
    }
}

/// Cold-start popularity seeding range (inclusive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularityConfig {
    #[serde(default = "defaults::seed_min")]
    pub seed_min: u64,

    #[serde(default = "defaults::seed_max")]
    pub seed_max: u64,
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self {
            seed_min: defaults::seed_min(),
            seed_max: defaults::seed_max(),
        }
    }
}

/// Endpoints for one upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoints {
    /// API root, no trailing slash
    pub base_url: String,

    /// CDN root that relative image paths resolve against
    pub image_root: String,
}

/// All three upstream sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "defaults::ophim")]
    pub ophim: SourceEndpoints,

    #[serde(default = "defaults::kkphim")]
    pub kkphim: SourceEndpoints,

    #[serde(default = "defaults::nguonc")]
    pub nguonc: SourceEndpoints,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ophim: defaults::ophim(),
            kkphim: defaults::kkphim(),
            nguonc: defaults::nguonc(),
        }
    }
}

mod defaults {
    use super::SourceEndpoints;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; cinesync/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Sync defaults
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn request_jitter() -> u64 {
        250
    }
    pub fn batch_pause() -> u64 {
        1000
    }
    pub fn retry_limit() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        1500
    }
    pub fn notify_window() -> i64 {
        30
    }

    // Popularity defaults
    pub fn seed_min() -> u64 {
        1000
    }
    pub fn seed_max() -> u64 {
        10000
    }

    // Source defaults
    pub fn ophim() -> SourceEndpoints {
        SourceEndpoints {
            base_url: "https://ophim1.com".into(),
            image_root: "https://img.ophim.live/uploads/movies".into(),
        }
    }
    pub fn kkphim() -> SourceEndpoints {
        SourceEndpoints {
            base_url: "https://phimapi.com".into(),
            image_root: "https://phimimg.com".into(),
        }
    }
    pub fn nguonc() -> SourceEndpoints {
        SourceEndpoints {
            base_url: "https://phim.nguonc.com/api".into(),
            image_root: "https://phim.nguonc.com/public/images".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.sync.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_seed_range() {
        let mut config = Config::default();
        config.popularity.seed_min = 5000;
        config.popularity.seed_max = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.max_concurrent, 5);
        assert_eq!(config.sync.retry_limit, 3);
        assert_eq!(config.popularity.seed_min, 1000);
        assert_eq!(config.popularity.seed_max, 10000);
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let config: Config = toml::from_str("[sync]\nretry_limit = 5\n").unwrap();
        assert_eq!(config.sync.retry_limit, 5);
        assert_eq!(config.sync.max_concurrent, 5);
        assert!(config.validate().is_ok());
    }
}
