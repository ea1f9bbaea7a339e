// src/store/mod.rs

//! Canonical store abstractions.
//!
//! The store is the only shared mutable resource in the system. Upserts
//! are atomic per slug; no cross-slug transaction is ever required. The
//! rest of the application consumes it read-only.

pub mod json;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::CanonicalItem;

pub use json::JsonStore;

/// Backend for the canonical item collection, keyed by slug.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, slug: &str) -> Result<Option<CanonicalItem>>;

    /// Insert or replace the record for `item.slug`, atomically with
    /// respect to concurrent upserts of the same slug.
    async fn upsert(&self, item: CanonicalItem) -> Result<()>;

    async fn len(&self) -> Result<usize>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, CanonicalItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, slug: &str) -> Result<Option<CanonicalItem>> {
        Ok(self.items.read().await.get(slug).cloned())
    }

    async fn upsert(&self, item: CanonicalItem) -> Result<()> {
        self.items.write().await.insert(item.slug.clone(), item);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.items.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::ItemStatus;

    fn item(slug: &str) -> CanonicalItem {
        CanonicalItem {
            slug: slug.into(),
            name: "Test".into(),
            origin_name: String::new(),
            description: String::new(),
            poster_url: String::new(),
            thumb_url: String::new(),
            year: None,
            categories: vec![],
            countries: vec![],
            episode_current: "Tap 1".into(),
            episode_total: None,
            views: 1,
            status: ItemStatus::Ongoing,
            metadata_priority: 0,
            last_notified_episode: None,
            stream_groups: vec![],
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get() {
        let store = MemoryStore::new();
        store.upsert(item("a")).await.unwrap();

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded.slug, "a");
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_by_slug() {
        let store = MemoryStore::new();
        store.upsert(item("a")).await.unwrap();

        let mut updated = item("a");
        updated.episode_current = "Tap 2".into();
        store.upsert(updated).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded.episode_current, "Tap 2");
    }
}
