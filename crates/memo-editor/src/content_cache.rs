//! Unsaved editor content, kept per editor instance so an interrupted edit
//! can be restored when the editor is opened again.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::fs::try_exists;

const KEY_PREFIX: &str = "memo-editor-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContent {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Draft content keyed by `memo-editor-{cache_key}`. Mutations are in
/// memory; [`ContentCache::persist`] writes the whole map back to disk.
#[derive(Debug, Clone, Default)]
pub struct ContentCache {
    path: Option<PathBuf>,
    entries: HashMap<String, CachedContent>,
    dirty: bool,
}

impl ContentCache {
    /// Cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the cache file at `path`. A missing file yields an empty cache;
    /// an unreadable one is logged and ignored.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut entries = HashMap::new();

        if try_exists(&path).await? {
            let json = fs::read_to_string(&path).await?;
            match serde_json::from_str::<HashMap<String, CachedContent>>(&json) {
                Ok(loaded) => entries = loaded,
                Err(e) => log::warn!(
                    "Ignoring unreadable draft cache '{}': {}",
                    path.display(),
                    e
                ),
            }
        }

        log::debug!("Loaded {} cached drafts from {}", entries.len(), path.display());
        Ok(Self {
            path: Some(path),
            entries,
            dirty: false,
        })
    }

    pub fn storage_key(cache_key: &str) -> String {
        format!("{}{}", KEY_PREFIX, cache_key)
    }

    pub fn get(&self, cache_key: &str) -> Option<&str> {
        self.entries
            .get(&Self::storage_key(cache_key))
            .map(|entry| entry.content.as_str())
    }

    pub fn set(&mut self, cache_key: &str, content: &str) {
        let entry = CachedContent {
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        self.entries.insert(Self::storage_key(cache_key), entry);
        self.dirty = true;
    }

    pub fn remove(&mut self, cache_key: &str) {
        if self.entries.remove(&Self::storage_key(cache_key)).is_some() {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes pending changes to disk. No-op for an in-memory or clean cache.
    pub async fn persist(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, json).await?;
        self.dirty = false;
        log::debug!("Persisted {} cached drafts", self.entries.len());
        Ok(())
    }
}
