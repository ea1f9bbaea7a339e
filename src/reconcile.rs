// src/reconcile.rs

//! Reconciliation of one source's raw detail into the canonical record.
//!
//! The reconciler never retries and never touches the store; it is a pure
//! merge step. Retry is the orchestrator's job, persistence is the
//! store's. The only fatal input is a detail payload with no slug.

use chrono::Utc;
use rand::Rng;

use crate::config::PopularityConfig;
use crate::error::{AppError, Result};
use crate::models::{CanonicalItem, ItemStatus, RawDetail, StreamGroup};
use crate::sources::SourceId;

/// What a reconciliation changed, relative to the prior record.
///
/// Feeds the change notifier: only genuine new-content events trigger
/// notifications, never a re-crawl of unchanged data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Episode count grew compared to the prior record
    pub episode_count_increased: bool,

    /// The reported current-episode label differs from the prior record
    pub episode_label_changed: bool,

    /// Status flipped to completed for the first time
    pub newly_completed: bool,

    /// The episode label observed in this reconciliation
    pub observed_episode: String,
}

impl ChangeSet {
    /// Whether this update represents a genuine new-content event.
    pub fn is_new_content(&self) -> bool {
        self.episode_count_increased || self.episode_label_changed || self.newly_completed
    }
}

/// Seam for the cold-start popularity heuristic.
///
/// New items are seeded with a randomized counter so they surface in
/// popularity-sorted views. A product decision, not a data one; kept
/// behind this trait so a read-time ranking concern can replace it.
pub trait PopularitySeeder: Send + Sync {
    fn seed(&self) -> u64;
}

/// Uniform random seed in an inclusive range.
pub struct RandomSeeder {
    min: u64,
    max: u64,
}

impl RandomSeeder {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn from_config(config: &PopularityConfig) -> Self {
        Self::new(config.seed_min, config.seed_max)
    }
}

impl PopularitySeeder for RandomSeeder {
    fn seed(&self) -> u64 {
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Fixed seed, for deterministic tests and offline tooling.
pub struct FixedSeeder(pub u64);

impl PopularitySeeder for FixedSeeder {
    fn seed(&self) -> u64 {
        self.0
    }
}

/// Merges raw source payloads into canonical records.
pub struct Reconciler {
    seeder: Box<dyn PopularitySeeder>,
}

impl Reconciler {
    pub fn new(seeder: Box<dyn PopularitySeeder>) -> Self {
        Self { seeder }
    }

    pub fn from_config(config: &PopularityConfig) -> Self {
        Self::new(Box::new(RandomSeeder::from_config(config)))
    }

    /// Merge `raw` from `source` against the existing canonical record.
    ///
    /// Returns the merged record plus the change set for notification
    /// dispatch. Reconciling identical detail twice yields an identical
    /// record and an empty change set the second time.
    ///
    /// Scalar metadata carries a provenance priority: the highest-priority
    /// source seen so far owns those fields regardless of the order the
    /// sources were processed in. Stream groups are per-source and are
    /// unaffected by provenance.
    pub fn reconcile(
        &self,
        existing: Option<&CanonicalItem>,
        raw: RawDetail,
        source: SourceId,
    ) -> Result<(CanonicalItem, ChangeSet)> {
        if raw.slug.trim().is_empty() {
            return Err(AppError::reconcile(
                raw.name.clone(),
                "detail payload has no slug",
            ));
        }

        // Popularity: carry a positive counter forward untouched, reseed
        // zero/absent. Upstream view counts are never trusted.
        let views = match existing {
            Some(prior) if prior.views > 0 => prior.views,
            _ => self.seeder.seed(),
        };

        // Scalar metadata follows source priority, not arrival order: a
        // lower-priority source never overwrites fields a higher-priority
        // source already supplied. Equal or higher priority updates freely.
        let scalars_from_raw = existing
            .map(|prior| source.priority() <= prior.metadata_priority)
            .unwrap_or(true);

        let status = if raw.completed {
            ItemStatus::Completed
        } else {
            ItemStatus::Ongoing
        };

        // Fresh groups for the reconciling source fully replace that
        // source's prior groups; every other source's groups survive.
        let mut stream_groups: Vec<StreamGroup> = existing
            .map(|prior| {
                prior
                    .stream_groups
                    .iter()
                    .filter(|g| g.source != source)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for server in &raw.servers {
            stream_groups.push(StreamGroup {
                label: source.group_label(&server.name),
                source,
                priority: source.priority(),
                episodes: server.episodes.clone(),
            });
        }

        // Stable sort on explicit priority: index 0 is always the
        // highest-priority source present.
        stream_groups.sort_by_key(|g| g.priority);

        let merged = match existing {
            Some(prior) if !scalars_from_raw => CanonicalItem {
                slug: raw.slug,
                name: prior.name.clone(),
                origin_name: prior.origin_name.clone(),
                description: prior.description.clone(),
                poster_url: prior.poster_url.clone(),
                thumb_url: prior.thumb_url.clone(),
                year: prior.year,
                categories: prior.categories.clone(),
                countries: prior.countries.clone(),
                episode_current: prior.episode_current.clone(),
                episode_total: prior.episode_total,
                views,
                status: prior.status,
                metadata_priority: prior.metadata_priority,
                last_notified_episode: prior.last_notified_episode.clone(),
                stream_groups,
                updated_at: Utc::now(),
            },
            _ => CanonicalItem {
                slug: raw.slug,
                name: raw.name,
                origin_name: raw.origin_name,
                description: raw.description,
                poster_url: raw.poster_url,
                thumb_url: raw.thumb_url,
                year: raw.year,
                categories: raw.categories,
                countries: raw.countries,
                episode_current: raw.episode_current,
                episode_total: raw.episode_total,
                views,
                status,
                metadata_priority: source.priority(),
                last_notified_episode: existing.and_then(|p| p.last_notified_episode.clone()),
                stream_groups,
                updated_at: Utc::now(),
            },
        };

        let changes = detect_changes(existing, &merged);
        Ok((merged, changes))
    }
}

/// Compare the merged record against the prior one.
fn detect_changes(existing: Option<&CanonicalItem>, merged: &CanonicalItem) -> ChangeSet {
    let observed = merged.episode_current.clone();

    let Some(prior) = existing else {
        // First sighting counts as new content; recipients for a record
        // nobody could have favorited yet are naturally empty.
        return ChangeSet {
            episode_label_changed: true,
            observed_episode: observed,
            ..ChangeSet::default()
        };
    };

    ChangeSet {
        episode_count_increased: merged.episode_count() > prior.episode_count(),
        episode_label_changed: merged.episode_current != prior.episode_current,
        // A record that stays completed across crawls never re-triggers.
        newly_completed: merged.status == ItemStatus::Completed
            && prior.status != ItemStatus::Completed,
        observed_episode: observed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Episode, RawServer};

    fn raw(slug: &str, label: &str, episodes: usize) -> RawDetail {
        RawDetail {
            slug: slug.into(),
            name: "Test Movie".into(),
            origin_name: "Test".into(),
            description: "desc".into(),
            poster_url: "https://cdn/p.jpg".into(),
            thumb_url: "https://cdn/t.jpg".into(),
            year: Some(2024),
            categories: vec!["Action".into()],
            countries: vec!["Korea".into()],
            episode_current: label.into(),
            episode_total: Some(12),
            completed: false,
            servers: vec![RawServer {
                name: "Vietsub #1".into(),
                episodes: (1..=episodes)
                    .map(|i| Episode {
                        name: format!("Tap {i}"),
                        slug: format!("tap-{i}"),
                        links: vec![format!("https://m/{i}")],
                    })
                    .collect(),
            }],
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Box::new(FixedSeeder(5000)))
    }

    #[test]
    fn cold_start_seeds_popularity_in_range() {
        let r = Reconciler::new(Box::new(RandomSeeder::new(1000, 10000)));
        let (item, _) = r.reconcile(None, raw("x", "Tap 1", 1), SourceId::Ophim).unwrap();
        assert!((1000..=10000).contains(&item.views), "views = {}", item.views);
    }

    #[test]
    fn positive_popularity_carried_forward() {
        let r = reconciler();
        let (first, _) = r.reconcile(None, raw("x", "Tap 1", 1), SourceId::Ophim).unwrap();
        let mut prior = first.clone();
        prior.views = 777;

        let (second, _) = r
            .reconcile(Some(&prior), raw("x", "Tap 2", 2), SourceId::Ophim)
            .unwrap();
        assert_eq!(second.views, 777);
    }

    #[test]
    fn zero_popularity_is_reseeded() {
        let r = reconciler();
        let (first, _) = r.reconcile(None, raw("x", "Tap 1", 1), SourceId::Ophim).unwrap();
        let mut prior = first;
        prior.views = 0;

        let (second, _) = r
            .reconcile(Some(&prior), raw("x", "Tap 1", 1), SourceId::Ophim)
            .unwrap();
        assert_eq!(second.views, 5000);
    }

    #[test]
    fn idempotent_reconciliation() {
        let r = reconciler();
        let (first, changes) = r.reconcile(None, raw("x", "Tap 3", 3), SourceId::Ophim).unwrap();
        assert!(changes.is_new_content());

        let (second, changes) = r
            .reconcile(Some(&first), raw("x", "Tap 3", 3), SourceId::Ophim)
            .unwrap();
        assert!(!changes.is_new_content());
        assert_eq!(second.stream_groups, first.stream_groups);
        assert_eq!(second.views, first.views);
        assert_eq!(second.last_notified_episode, first.last_notified_episode);
    }

    #[test]
    fn source_isolation_other_groups_survive() {
        let r = reconciler();
        let (a, _) = r.reconcile(None, raw("x", "Tap 2", 2), SourceId::KkPhim).unwrap();
        let (b, _) = r
            .reconcile(Some(&a), raw("x", "Tap 2", 2), SourceId::NguonC)
            .unwrap();
        assert_eq!(b.stream_groups.len(), 2);

        // Re-crawling NguonC must not disturb KKPhim's group.
        let (c, _) = r
            .reconcile(Some(&b), raw("x", "Tap 3", 3), SourceId::NguonC)
            .unwrap();
        assert_eq!(c.groups_of(SourceId::KkPhim).count(), 1);
        assert_eq!(
            c.groups_of(SourceId::KkPhim).next().unwrap().episodes.len(),
            2
        );
        assert_eq!(
            c.groups_of(SourceId::NguonC).next().unwrap().episodes.len(),
            3
        );
    }

    #[test]
    fn same_source_group_fully_replaced() {
        let r = reconciler();
        let (a, _) = r.reconcile(None, raw("x", "Tap 5", 5), SourceId::Ophim).unwrap();
        let (b, _) = r
            .reconcile(Some(&a), raw("x", "Tap 6", 6), SourceId::Ophim)
            .unwrap();
        assert_eq!(b.groups_of(SourceId::Ophim).count(), 1);
        assert_eq!(b.episode_count(), 6);
    }

    #[test]
    fn priority_determinism_regardless_of_order() {
        let r = reconciler();
        // Lowest-priority source first, then highest, then middle; the
        // biggest episode count sits on the lowest-priority source.
        let (a, _) = r.reconcile(None, raw("x", "Tap 9", 9), SourceId::NguonC).unwrap();
        let (b, _) = r
            .reconcile(Some(&a), raw("x", "Tap 9", 4), SourceId::Ophim)
            .unwrap();
        let (c, _) = r
            .reconcile(Some(&b), raw("x", "Tap 9", 6), SourceId::KkPhim)
            .unwrap();

        assert_eq!(c.stream_groups[0].source, SourceId::Ophim);
        assert_eq!(c.stream_groups[1].source, SourceId::KkPhim);
        assert_eq!(c.stream_groups[2].source, SourceId::NguonC);
    }

    #[test]
    fn lower_priority_source_keeps_higher_priority_metadata() {
        let r = reconciler();
        let mut from_ophim = raw("x", "Tap 2", 2);
        from_ophim.name = "Ophim Name".into();
        let (a, _) = r.reconcile(None, from_ophim, SourceId::Ophim).unwrap();
        assert_eq!(a.metadata_priority, 0);

        let mut from_nguonc = raw("x", "Tap 5", 5);
        from_nguonc.name = "NguonC Name".into();
        let (b, _) = r
            .reconcile(Some(&a), from_nguonc, SourceId::NguonC)
            .unwrap();

        // Scalars stay with the higher-priority source; the lower-priority
        // source's stream group still lands.
        assert_eq!(b.name, "Ophim Name");
        assert_eq!(b.episode_current, "Tap 2");
        assert_eq!(b.metadata_priority, 0);
        assert_eq!(b.groups_of(SourceId::NguonC).count(), 1);

        // The owning source itself still updates freely.
        let mut ophim_next = raw("x", "Tap 3", 3);
        ophim_next.name = "Ophim Name v2".into();
        let (c, changes) = r
            .reconcile(Some(&b), ophim_next, SourceId::Ophim)
            .unwrap();
        assert_eq!(c.name, "Ophim Name v2");
        assert!(changes.episode_label_changed);
    }

    #[test]
    fn higher_priority_source_overwrites_metadata() {
        let r = reconciler();
        let mut from_nguonc = raw("x", "Tap 1", 1);
        from_nguonc.name = "NguonC Name".into();
        let (a, _) = r.reconcile(None, from_nguonc, SourceId::NguonC).unwrap();
        assert_eq!(a.metadata_priority, 2);

        let mut from_ophim = raw("x", "Tap 1", 1);
        from_ophim.name = "Ophim Name".into();
        let (b, _) = r.reconcile(Some(&a), from_ophim, SourceId::Ophim).unwrap();
        assert_eq!(b.name, "Ophim Name");
        assert_eq!(b.metadata_priority, 0);
    }

    #[test]
    fn detects_episode_count_increase() {
        let r = reconciler();
        let (a, _) = r.reconcile(None, raw("x", "Tap 3", 3), SourceId::Ophim).unwrap();
        let (_, changes) = r
            .reconcile(Some(&a), raw("x", "Tap 3", 4), SourceId::Ophim)
            .unwrap();
        assert!(changes.episode_count_increased);
        assert!(!changes.episode_label_changed);
    }

    #[test]
    fn detects_completion_transition_once() {
        let r = reconciler();
        let (a, _) = r.reconcile(None, raw("x", "Tap 12", 12), SourceId::Ophim).unwrap();

        let mut finished = raw("x", "Hoan Tat (12/12)", 12);
        finished.completed = true;
        let (b, changes) = r
            .reconcile(Some(&a), finished.clone(), SourceId::Ophim)
            .unwrap();
        assert!(changes.newly_completed);

        // Still completed on the next crawl: no re-trigger.
        let (_, changes) = r.reconcile(Some(&b), finished, SourceId::Ophim).unwrap();
        assert!(!changes.newly_completed);
        assert!(!changes.is_new_content());
    }

    #[test]
    fn missing_slug_is_fatal_for_the_item() {
        let r = reconciler();
        let result = r.reconcile(None, raw("  ", "Tap 1", 1), SourceId::Ophim);
        assert!(matches!(result, Err(AppError::Reconcile { .. })));
    }
}
