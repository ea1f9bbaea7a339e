// src/notify.rs

//! New-episode notification fan-out.
//!
//! Decides, from the reconciler's change set, whether an update is a
//! genuine new-content event, and to whom it should go. Delivery itself
//! is behind [`NotificationSink`]; the surrounding application provides
//! the push service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::CanonicalItem;
use crate::reconcile::ChangeSet;

/// A notification ready for out-of-band delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,

    /// Deep link into the item page
    pub link: String,
}

/// Delivery backend for notification payloads.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload, recipients: &[String]) -> Result<()>;
}

/// Sink that only logs, for local runs.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, payload: &NotificationPayload, recipients: &[String]) -> Result<()> {
        log::info!(
            "notify {} user(s): {} - {}",
            recipients.len(),
            payload.title,
            payload.body
        );
        Ok(())
    }
}

/// Lookup of users interested in an item.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users who favorited the slug.
    async fn favorites_of(&self, slug: &str) -> Result<Vec<String>>;

    /// Users with an in-progress watch record on the slug since `since`.
    async fn recent_watchers(&self, slug: &str, since: DateTime<Utc>) -> Result<Vec<String>>;
}

/// In-memory directory for tests and local runs.
#[derive(Default)]
pub struct MemoryDirectory {
    favorites: RwLock<HashMap<String, Vec<String>>>,
    watches: RwLock<Vec<WatchRecord>>,
}

#[derive(Debug, Clone)]
struct WatchRecord {
    user: String,
    slug: String,
    watched_at: DateTime<Utc>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_favorite(&self, user: &str, slug: &str) {
        self.favorites
            .write()
            .await
            .entry(slug.to_string())
            .or_default()
            .push(user.to_string());
    }

    pub async fn add_watch(&self, user: &str, slug: &str, watched_at: DateTime<Utc>) {
        self.watches.write().await.push(WatchRecord {
            user: user.to_string(),
            slug: slug.to_string(),
            watched_at,
        });
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn favorites_of(&self, slug: &str) -> Result<Vec<String>> {
        Ok(self
            .favorites
            .read()
            .await
            .get(slug)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_watchers(&self, slug: &str, since: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(self
            .watches
            .read()
            .await
            .iter()
            .filter(|w| w.slug == slug && w.watched_at >= since)
            .map(|w| w.user.clone())
            .collect())
    }
}

/// Decides whether to fan out a new-episode event and sends it.
pub struct ChangeNotifier {
    directory: Arc<dyn UserDirectory>,
    sink: Arc<dyn NotificationSink>,

    /// Trailing window for in-progress watchers
    window: Duration,
}

impl ChangeNotifier {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        sink: Arc<dyn NotificationSink>,
        window_days: i64,
    ) -> Self {
        Self {
            directory,
            sink,
            window: Duration::days(window_days),
        }
    }

    /// Process a reconciled update. Returns how many users were notified.
    ///
    /// Sends only when the change set reports genuine new content AND the
    /// observed episode label differs from `last_notified_episode`. Either
    /// way the marker is advanced to the observed label, so the next crawl
    /// of unchanged data is a guaranteed no-op.
    pub async fn process(&self, item: &mut CanonicalItem, changes: &ChangeSet) -> Result<usize> {
        let observed = changes.observed_episode.clone();
        let already_notified = item.last_notified_episode.as_deref() == Some(observed.as_str());

        let mut notified = 0;
        if changes.is_new_content() && !already_notified {
            let recipients = self.recipients(&item.slug).await?;
            if !recipients.is_empty() {
                let payload = self.payload(item, &observed);
                self.sink.deliver(&payload, &recipients).await?;
                notified = recipients.len();
            }
        }

        item.last_notified_episode = Some(observed);
        Ok(notified)
    }

    /// Union of favoriters and recent watchers, deduplicated by user id.
    async fn recipients(&self, slug: &str) -> Result<Vec<String>> {
        let since = Utc::now() - self.window;
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        for user in self
            .directory
            .favorites_of(slug)
            .await?
            .into_iter()
            .chain(self.directory.recent_watchers(slug, since).await?)
        {
            if seen.insert(user.clone()) {
                recipients.push(user);
            }
        }
        Ok(recipients)
    }

    fn payload(&self, item: &CanonicalItem, episode: &str) -> NotificationPayload {
        NotificationPayload {
            title: format!("{} has a new episode", item.name),
            body: format!("{} is now available", episode),
            link: format!("/phim/{}", item.slug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    use crate::models::ItemStatus;

    /// Records every delivery instead of sending.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(NotificationPayload, Vec<String>)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(
            &self,
            payload: &NotificationPayload,
            recipients: &[String],
        ) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((payload.clone(), recipients.to_vec()));
            Ok(())
        }
    }

    fn item(slug: &str, episode: &str, last_notified: Option<&str>) -> CanonicalItem {
        CanonicalItem {
            slug: slug.into(),
            name: "Test Movie".into(),
            origin_name: "Test".into(),
            description: String::new(),
            poster_url: String::new(),
            thumb_url: String::new(),
            year: None,
            categories: vec![],
            countries: vec![],
            episode_current: episode.into(),
            episode_total: None,
            views: 1000,
            status: ItemStatus::Ongoing,
            metadata_priority: 0,
            last_notified_episode: last_notified.map(Into::into),
            stream_groups: vec![],
            updated_at: Utc::now(),
        }
    }

    fn changes(observed: &str, changed: bool) -> ChangeSet {
        ChangeSet {
            episode_label_changed: changed,
            observed_episode: observed.into(),
            ..ChangeSet::default()
        }
    }

    fn notifier_with(directory: Arc<MemoryDirectory>) -> (ChangeNotifier, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let notifier = ChangeNotifier::new(directory, sink.clone(), 30);
        (notifier, sink)
    }

    #[tokio::test]
    async fn notifies_union_of_favorites_and_watchers() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_favorite("alice", "x").await;
        directory.add_watch("bob", "x", Utc::now()).await;
        // Favorited AND watching: must be counted once.
        directory.add_favorite("bob", "x").await;

        let (notifier, sink) = notifier_with(directory);
        let mut target = item("x", "Tap 5", Some("Tap 4"));
        let count = notifier
            .process(&mut target, &changes("Tap 5", true))
            .await
            .unwrap();

        assert_eq!(count, 2);
        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec!["alice", "bob"]);
        assert_eq!(target.last_notified_episode.as_deref(), Some("Tap 5"));
    }

    #[tokio::test]
    async fn suppresses_already_notified_episode() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_favorite("alice", "x").await;

        let (notifier, sink) = notifier_with(directory);
        let mut target = item("x", "Tap 5", Some("Tap 5"));
        let count = notifier
            .process(&mut target, &changes("Tap 5", true))
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(sink.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn suppresses_when_no_genuine_change() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_favorite("alice", "x").await;

        let (notifier, sink) = notifier_with(directory);
        let mut target = item("x", "Tap 5", None);
        let count = notifier
            .process(&mut target, &changes("Tap 5", false))
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(sink.sent.lock().await.is_empty());
        // Marker still advances so the next crawl is a no-op.
        assert_eq!(target.last_notified_episode.as_deref(), Some("Tap 5"));
    }

    #[tokio::test]
    async fn completed_item_stays_quiet_on_recrawl() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_favorite("alice", "x").await;

        let (notifier, sink) = notifier_with(directory);
        let mut target = item("x", "Ep 12 (End)", Some("Ep 12 (End)"));
        target.status = ItemStatus::Completed;

        // Re-crawl of identical detail: no change detected, label already
        // notified. Nothing may go out.
        let count = notifier
            .process(&mut target, &changes("Ep 12 (End)", false))
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(sink.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn stale_watchers_outside_window_excluded() {
        let directory = Arc::new(MemoryDirectory::new());
        directory
            .add_watch("old-bob", "x", Utc::now() - Duration::days(45))
            .await;
        directory.add_watch("new-eve", "x", Utc::now()).await;

        let (notifier, _) = notifier_with(directory);
        let mut target = item("x", "Tap 2", Some("Tap 1"));
        let count = notifier
            .process(&mut target, &changes("Tap 2", true))
            .await
            .unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn no_recipients_still_advances_marker() {
        let directory = Arc::new(MemoryDirectory::new());
        let (notifier, sink) = notifier_with(directory);

        let mut target = item("x", "Tap 9", None);
        let count = notifier
            .process(&mut target, &changes("Tap 9", true))
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(sink.sent.lock().await.is_empty());
        assert_eq!(target.last_notified_episode.as_deref(), Some("Tap 9"));
    }
}
