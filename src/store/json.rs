// src/store/json.rs

//! File-backed canonical store.
//!
//! A single `catalog.json` keyed by slug, written atomically (temp file,
//! then rename). Suitable for local runs and the CLI; deployments put a
//! real document store behind [`ContentStore`] instead.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::CanonicalItem;
use crate::store::ContentStore;

const CATALOG_FILE: &str = "catalog.json";

/// JSON-file store rooted at a directory.
pub struct JsonStore {
    root_dir: PathBuf,

    // Serializes read-modify-write cycles; upsert atomicity per slug
    // follows from whole-file exclusivity.
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self) -> PathBuf {
        self.root_dir.join(CATALOG_FILE)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_catalog(&self) -> Result<HashMap<String, CanonicalItem>> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn write_catalog(&self, catalog: &HashMap<String, CanonicalItem>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(catalog)?;
        self.write_bytes(&bytes).await
    }
}

#[async_trait]
impl ContentStore for JsonStore {
    async fn get(&self, slug: &str) -> Result<Option<CanonicalItem>> {
        Ok(self.read_catalog().await?.remove(slug))
    }

    async fn upsert(&self, item: CanonicalItem) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut catalog = self.read_catalog().await?;
        catalog.insert(item.slug.clone(), item);
        self.write_catalog(&catalog).await
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read_catalog().await?.len())
    }
}
