//! Canonical catalog item and its stream groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sources::SourceId;

/// Airing status of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ongoing,
    Completed,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self::Ongoing
    }
}

/// One playable episode inside a stream group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Display name (e.g. "Tap 12", "Full")
    pub name: String,

    /// Episode slug within the item
    pub slug: String,

    /// Playback URLs (embed and/or m3u8)
    pub links: Vec<String>,
}

/// One upstream source's episode set for a canonical item.
///
/// Groups from different sources coexist on the same item and are never
/// merged into one list: losing one source's links must never destroy
/// another source's links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamGroup {
    /// Source-namespaced label (e.g. "Ophim - Vietsub #1")
    pub label: String,

    /// The source that produced this group
    pub source: SourceId,

    /// Sort key, copied from the source's priority at merge time.
    /// Lower sorts first; index 0 is always the preferred source.
    pub priority: u8,

    /// Ordered episode list as reported by the source
    pub episodes: Vec<Episode>,
}

/// The merged, stable record for one logical catalog item.
///
/// Keyed by a source-independent slug, unique and immutable once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// Unique, source-independent identifier
    pub slug: String,

    /// Display title
    pub name: String,

    /// Original-language title
    pub origin_name: String,

    /// Plot summary / description
    pub description: String,

    /// Absolute poster image URL
    pub poster_url: String,

    /// Absolute thumbnail image URL
    pub thumb_url: String,

    /// Release year, when the source reports one
    pub year: Option<u16>,

    /// Genre labels
    pub categories: Vec<String>,

    /// Country labels
    pub countries: Vec<String>,

    /// Current-episode label as reported upstream (e.g. "Tap 12", "Full")
    pub episode_current: String,

    /// Total episode count announced upstream, if any
    pub episode_total: Option<u32>,

    /// Popularity counter. Never trusted from upstream; carried forward
    /// once positive, reseeded when zero or absent.
    pub views: u64,

    pub status: ItemStatus,

    /// Priority of the source that last supplied the scalar metadata
    /// (name, description, images, episode labels, status). A
    /// lower-priority source never overwrites these fields.
    #[serde(default)]
    pub metadata_priority: u8,

    /// Last episode label that triggered a notification, for de-duplication
    pub last_notified_episode: Option<String>,

    /// Per-source episode sets, sorted by `priority`
    pub stream_groups: Vec<StreamGroup>,

    pub updated_at: DateTime<Utc>,
}

impl CanonicalItem {
    /// Episode count used for change detection.
    ///
    /// The maximum group size, not the sum: sources carry duplicate copies
    /// of the same episodes, so a sum would double-count whenever a second
    /// source appears.
    pub fn episode_count(&self) -> usize {
        self.stream_groups
            .iter()
            .map(|g| g.episodes.len())
            .max()
            .unwrap_or(0)
    }

    /// Stream groups belonging to one source.
    pub fn groups_of(&self, source: SourceId) -> impl Iterator<Item = &StreamGroup> {
        self.stream_groups.iter().filter(move |g| g.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(source: SourceId, count: usize) -> StreamGroup {
        StreamGroup {
            label: format!("{} - Server", source.tag()),
            source,
            priority: source.priority(),
            episodes: (1..=count)
                .map(|i| Episode {
                    name: format!("Tap {i}"),
                    slug: format!("tap-{i}"),
                    links: vec![format!("https://cdn.example/{i}.m3u8")],
                })
                .collect(),
        }
    }

    fn item_with(groups: Vec<StreamGroup>) -> CanonicalItem {
        CanonicalItem {
            slug: "test-item".into(),
            name: "Test Item".into(),
            origin_name: "Test".into(),
            description: String::new(),
            poster_url: String::new(),
            thumb_url: String::new(),
            year: Some(2024),
            categories: vec![],
            countries: vec![],
            episode_current: "Tap 3".into(),
            episode_total: None,
            views: 0,
            status: ItemStatus::Ongoing,
            metadata_priority: 0,
            last_notified_episode: None,
            stream_groups: groups,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn episode_count_is_max_not_sum() {
        let item = item_with(vec![group(SourceId::Ophim, 12), group(SourceId::KkPhim, 10)]);
        assert_eq!(item.episode_count(), 12);
    }

    #[test]
    fn episode_count_empty() {
        assert_eq!(item_with(vec![]).episode_count(), 0);
    }

    #[test]
    fn groups_of_filters_by_source() {
        let item = item_with(vec![group(SourceId::Ophim, 2), group(SourceId::NguonC, 2)]);
        assert_eq!(item.groups_of(SourceId::NguonC).count(), 1);
        assert_eq!(item.groups_of(SourceId::KkPhim).count(), 0);
    }

    #[test]
    fn status_serde_round_trip() {
        let json = serde_json::to_string(&ItemStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let back: ItemStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ItemStatus::Completed);
    }
}
