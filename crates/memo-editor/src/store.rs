//! Host capabilities consumed by the editor core.
//!
//! The session never talks to a backend directly; it is handed these trait
//! objects when it is opened.

use async_trait::async_trait;
use std::sync::Arc;

use crate::draft::{BlobUpload, Draft, Note, NoteId, Resource, ResourceId};
use crate::error::{SaveError, UploadError};

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Last persisted version known to the local cache. This is what
    /// autosave compares against.
    fn cached(&self, id: NoteId) -> Option<Note>;

    async fn get(&self, id: NoteId) -> Result<Option<Note>, SaveError>;

    /// Persists a brand new note. `keep_editing` is forwarded from the
    /// "save and continue editing" action.
    async fn create(&self, draft: &Draft, keep_editing: bool) -> Result<Note, SaveError>;

    async fn patch(&self, id: NoteId, draft: &Draft) -> Result<Note, SaveError>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn upsert_tag(&self, name: &str) -> Result<(), SaveError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, blob: BlobUpload) -> Result<Resource, UploadError>;

    /// Links an uploaded resource to an existing note.
    async fn attach(&self, resource: ResourceId, note: NoteId) -> Result<Resource, UploadError>;
}

/// The set of capabilities a session is opened with.
#[derive(Clone)]
pub struct Services {
    pub notes: Arc<dyn NoteStore>,
    pub tags: Arc<dyn TagStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Services {
    /// Uses one backend for all three capabilities.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: NoteStore + TagStore + BlobStore + 'static,
    {
        Self {
            notes: backend.clone(),
            tags: backend.clone(),
            blobs: backend,
        }
    }
}

/// Upserts every `#tag` in `content`.
pub async fn upsert_content_tags(tags: &dyn TagStore, content: &str) -> Result<(), SaveError> {
    for name in mdcore::extract_tags(content) {
        tags.upsert_tag(&name).await?;
    }
    Ok(())
}
