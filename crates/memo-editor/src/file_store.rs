//! Filesystem-backed note, tag and blob store.
//!
//! Layout under the data directory:
//! `notes/{id}.json`, `resources/{id}.json` + `resources/{id}_{filename}`,
//! and `tags.json`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::fs;
use tokio::fs::try_exists;
use tokio::sync::Mutex;

use crate::draft::{
    BlobUpload, Draft, Note, NoteId, Relation, Resource, ResourceId, RowStatus, UNKNOWN_ID,
};
use crate::error::{SaveError, UploadError};
use crate::store::{BlobStore, NoteStore, TagStore};

/// Largest blob accepted by `upload`.
pub const UPLOAD_SIZE_LIMIT: u64 = 32 * 1024 * 1024;

pub struct FileStore {
    root: PathBuf,
    notes: DashMap<NoteId, Note>,
    resources: DashMap<ResourceId, Resource>,
    tags: Mutex<BTreeSet<String>>,
    next_note_id: AtomicI64,
    next_resource_id: AtomicI64,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`, loading every
    /// persisted note and resource into the in-memory cache.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("notes")).await?;
        fs::create_dir_all(root.join("resources")).await?;

        let notes = DashMap::new();
        let mut max_note_id = 0;
        for note in load_json_dir::<Note>(&root.join("notes")).await? {
            max_note_id = max_note_id.max(note.id);
            if note.row_status == RowStatus::Normal {
                notes.insert(note.id, note);
            }
        }

        let resources = DashMap::new();
        let mut max_resource_id = 0;
        for resource in load_json_dir::<Resource>(&root.join("resources")).await? {
            max_resource_id = max_resource_id.max(resource.id);
            resources.insert(resource.id, resource);
        }

        let tags_path = root.join("tags.json");
        let tags = if try_exists(&tags_path).await? {
            let json = fs::read_to_string(&tags_path).await?;
            serde_json::from_str::<Vec<String>>(&json)
                .map(|list| list.into_iter().collect())
                .unwrap_or_else(|e| {
                    log::warn!("Failed to parse tags file '{}': {}", tags_path.display(), e);
                    BTreeSet::new()
                })
        } else {
            BTreeSet::new()
        };

        log::info!(
            "Opened store at {} ({} notes, {} resources)",
            root.display(),
            notes.len(),
            resources.len()
        );

        Ok(Self {
            root,
            notes,
            resources,
            tags: Mutex::new(tags),
            next_note_id: AtomicI64::new(max_note_id + 1),
            next_resource_id: AtomicI64::new(max_resource_id + 1),
        })
    }

    /// `MEMO_EDITOR_DATA_DIR` if set, otherwise the platform data directory.
    pub fn default_data_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MEMO_EDITOR_DATA_DIR") {
            return Ok(PathBuf::from(dir));
        }
        let dirs = directories::ProjectDirs::from("com", "memo-editor", "memo-editor")
            .ok_or_else(|| anyhow::anyhow!("Could not determine the data directory"))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn tags(&self) -> Vec<String> {
        self.tags.lock().await.iter().cloned().collect()
    }

    /// Marks a note archived. Archived notes leave the cache and can no
    /// longer be autosaved.
    pub async fn archive(&self, id: NoteId) -> Result<(), SaveError> {
        let mut note = self.cached(id).ok_or(SaveError::NotFound(id))?;
        note.row_status = RowStatus::Archived;
        note.updated_at = Utc::now();
        self.write_note(&note).await?;
        self.notes.remove(&id);
        Ok(())
    }

    fn note_path(&self, id: NoteId) -> PathBuf {
        self.root.join("notes").join(format!("{}.json", id))
    }

    fn resource_meta_path(&self, id: ResourceId) -> PathBuf {
        self.root.join("resources").join(format!("{}.json", id))
    }

    async fn write_note(&self, note: &Note) -> Result<(), SaveError> {
        let json = serde_json::to_string_pretty(note)?;
        fs::write(self.note_path(note.id), json).await?;
        Ok(())
    }

    async fn write_resource(&self, resource: &Resource) -> Result<(), UploadError> {
        let json = serde_json::to_string_pretty(resource)?;
        fs::write(self.resource_meta_path(resource.id), json).await?;
        Ok(())
    }

    fn resolve_resources(&self, ids: &[ResourceId]) -> Vec<Resource> {
        ids.iter()
            .filter_map(|id| match self.resources.get(id) {
                Some(resource) => Some(resource.clone()),
                None => {
                    log::warn!("Dropping unknown resource {} from note", id);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl NoteStore for FileStore {
    fn cached(&self, id: NoteId) -> Option<Note> {
        self.notes.get(&id).map(|note| note.clone())
    }

    async fn get(&self, id: NoteId) -> Result<Option<Note>, SaveError> {
        Ok(self.cached(id))
    }

    async fn create(&self, draft: &Draft, keep_editing: bool) -> Result<Note, SaveError> {
        let id = self.next_note_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let relations = draft
            .relations
            .iter()
            .map(|relation| Relation {
                memo_id: if relation.memo_id == UNKNOWN_ID {
                    id
                } else {
                    relation.memo_id
                },
                ..relation.clone()
            })
            .collect();
        let note = Note {
            id,
            content: draft.content.clone(),
            visibility: draft.visibility,
            resources: self.resolve_resources(&draft.resource_ids),
            relations,
            row_status: RowStatus::Normal,
            created_at: now,
            updated_at: now,
        };
        self.write_note(&note).await?;
        self.notes.insert(id, note.clone());
        log::info!("Created note {} (keep editing: {})", id, keep_editing);
        Ok(note)
    }

    async fn patch(&self, id: NoteId, draft: &Draft) -> Result<Note, SaveError> {
        let mut note = self.cached(id).ok_or(SaveError::NotFound(id))?;
        note.content = draft.content.clone();
        note.visibility = draft.visibility;
        note.resources = self.resolve_resources(&draft.resource_ids);
        note.relations = draft.relations.clone();
        note.updated_at = Utc::now();
        self.write_note(&note).await?;
        if note.row_status == RowStatus::Normal {
            self.notes.insert(id, note.clone());
        } else {
            self.notes.remove(&id);
        }
        log::debug!("Patched note {}", id);
        Ok(note)
    }
}

#[async_trait]
impl TagStore for FileStore {
    async fn upsert_tag(&self, name: &str) -> Result<(), SaveError> {
        let mut tags = self.tags.lock().await;
        if tags.insert(name.to_string()) {
            let list: Vec<&String> = tags.iter().collect();
            let json = serde_json::to_string_pretty(&list)?;
            fs::write(self.root.join("tags.json"), json).await?;
            log::debug!("Upserted tag '{}'", name);
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FileStore {
    async fn upload(&self, blob: BlobUpload) -> Result<Resource, UploadError> {
        let size = blob.bytes.len() as u64;
        if size > UPLOAD_SIZE_LIMIT {
            return Err(UploadError::TooLarge {
                filename: blob.filename,
                size,
                limit: UPLOAD_SIZE_LIMIT,
            });
        }

        let id = self.next_resource_id.fetch_add(1, Ordering::SeqCst);
        let safe_name = blob.filename.replace(['/', '\\'], "_");
        let blob_path = self
            .root
            .join("resources")
            .join(format!("{}_{}", id, safe_name));
        fs::write(&blob_path, &blob.bytes).await?;

        let resource = Resource {
            id,
            filename: blob.filename,
            mime_type: blob.mime_type,
            size,
            memo_id: None,
        };
        self.write_resource(&resource).await?;
        self.resources.insert(id, resource.clone());
        log::info!("Stored resource {} ({} bytes)", id, size);
        Ok(resource)
    }

    async fn attach(&self, resource: ResourceId, note: NoteId) -> Result<Resource, UploadError> {
        let mut updated = self
            .resources
            .get(&resource)
            .map(|entry| entry.clone())
            .ok_or(UploadError::NotFound(resource))?;
        updated.memo_id = Some(note);
        self.write_resource(&updated).await?;
        self.resources.insert(resource, updated.clone());
        Ok(updated)
    }
}

async fn load_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match fs::read_to_string(&path).await {
            Ok(json) => match serde_json::from_str::<T>(&json) {
                Ok(item) => items.push(item),
                Err(e) => log::warn!("Skipping unreadable '{}': {}", path.display(), e),
            },
            Err(e) => log::warn!("Failed to read '{}': {}", path.display(), e),
        }
    }
    Ok(items)
}
